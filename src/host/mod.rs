//! Fleet host table and run credentials.
//!
//! A [`Fleet`] is the immutable set of hosts targeted by one run. Host names
//! are unique within a fleet, and the table is fixed once a run starts. The
//! JSON table format matches the operator-maintained host files this tool
//! grew up with: an object mapping host name to connection address.

use std::collections::BTreeMap;

use thiserror::Error;

/// A single remote host in the fleet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Host {
    /// Unique name within the fleet, used in logs, outcomes, and artifact
    /// file names.
    pub name: String,
    /// Connection address: either `user@host` or a bare host/IP. A user
    /// embedded in the address overrides the run credentials' user.
    pub address: String,
    /// Per-host override: when set the host is excluded from this run and
    /// reported with a `Skipped` outcome instead of being processed.
    pub skip: bool,
}

impl Host {
    /// Creates a host entry, trimming both fields.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::BlankField`] when the name or address is empty
    /// after trimming.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Result<Self, HostError> {
        let name = name.into().trim().to_owned();
        let address = address.into().trim().to_owned();
        if name.is_empty() {
            return Err(HostError::BlankField {
                field: String::from("name"),
            });
        }
        if address.is_empty() {
            return Err(HostError::BlankField {
                field: String::from("address"),
            });
        }
        Ok(Self {
            name,
            address,
            skip: false,
        })
    }

    /// Returns the `user@host` login target for this host.
    ///
    /// An address that already carries a user wins over the credentials'
    /// default user.
    #[must_use]
    pub fn login(&self, credentials: &Credentials) -> String {
        if self.address.contains('@') {
            self.address.clone()
        } else {
            format!("{}@{}", credentials.user, self.address)
        }
    }
}

/// SSH credentials supplied once per run and held only for its lifetime.
///
/// Authentication is key or agent based; no password material is carried, so
/// nothing here ever reaches a remote command line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credentials {
    /// Default remote user for hosts whose address does not embed one.
    pub user: String,
    /// Optional SSH identity file passed to the transport via `-i`.
    pub identity_file: Option<String>,
}

impl Credentials {
    /// Creates credentials, trimming the user name.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::BlankField`] when the user is empty after
    /// trimming.
    pub fn new(
        user: impl Into<String>,
        identity_file: Option<String>,
    ) -> Result<Self, HostError> {
        let user = user.into().trim().to_owned();
        if user.is_empty() {
            return Err(HostError::BlankField {
                field: String::from("user"),
            });
        }
        Ok(Self {
            user,
            identity_file,
        })
    }
}

/// The immutable host table targeted by one run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Fleet {
    hosts: Vec<Host>,
}

impl Fleet {
    /// Builds a fleet from hosts, rejecting duplicate names.
    ///
    /// Submission order follows the order of `hosts`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::DuplicateHost`] when two entries share a name.
    pub fn new(hosts: Vec<Host>) -> Result<Self, HostError> {
        let mut seen = std::collections::BTreeSet::new();
        for host in &hosts {
            if !seen.insert(host.name.clone()) {
                return Err(HostError::DuplicateHost {
                    name: host.name.clone(),
                });
            }
        }
        Ok(Self { hosts })
    }

    /// Parses a JSON host table of the form `{"name": "user@addr", ...}`.
    ///
    /// Entries are ordered by name so submission order is deterministic
    /// regardless of the file's key order.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Parse`] for malformed JSON and
    /// [`HostError::BlankField`] for blank names or addresses.
    pub fn from_json_table(json: &str) -> Result<Self, HostError> {
        let table: BTreeMap<String, String> =
            serde_json::from_str(json).map_err(|err| HostError::Parse {
                message: err.to_string(),
            })?;
        let hosts = table
            .into_iter()
            .map(|(name, address)| Host::new(name, address))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(hosts)
    }

    /// Marks the named hosts as skipped for this run.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownHost`] when a name is not in the table.
    pub fn skip_hosts(&mut self, names: &[String]) -> Result<(), HostError> {
        for name in names {
            let host = self
                .hosts
                .iter_mut()
                .find(|host| &host.name == name)
                .ok_or_else(|| HostError::UnknownHost { name: name.clone() })?;
            host.skip = true;
        }
        Ok(())
    }

    /// Returns the hosts in submission order.
    #[must_use]
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// Returns the number of hosts, including skipped ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Returns `true` when the table has no hosts at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Errors raised while building the host table or credentials.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum HostError {
    /// Raised when a required field is empty after trimming.
    #[error("missing or empty field: {field}")]
    BlankField {
        /// Field that failed validation.
        field: String,
    },
    /// Raised when two hosts share a name.
    #[error("duplicate host name: {name}")]
    DuplicateHost {
        /// The colliding host name.
        name: String,
    },
    /// Raised when the JSON host table cannot be parsed.
    #[error("failed to parse host table: {message}")]
    Parse {
        /// Parser error message.
        message: String,
    },
    /// Raised when a skip selection names a host not in the table.
    #[error("unknown host: {name}")]
    UnknownHost {
        /// Name that was not found.
        name: String,
    },
}
