use core::fmt;
use std::collections::hash_map::{Entry, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use semver::Version;
use thiserror::Error;

use crate::error::NotSupported;
use crate::protocol::{ProtocolSpec, StreamTag};
use crate::version::is_compatible;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("protocol `{0}` is already registered")]
    AlreadyRegistered(String),

    #[error("protocol name must not be empty")]
    EmptyName,

    #[error("protocol `{name}` has invalid version `{version}`")]
    InvalidVersion { name: String, version: String },

    #[error("protocol `{0}` has a stream with an empty name")]
    EmptyStreamName(String),

    #[error("protocol `{name}` declares stream `{stream}` more than once")]
    DuplicateStream { name: String, stream: String },
}

/// A stream request matched to its handler.
#[derive(Clone, Debug)]
pub struct Resolved<H> {
    pub tag: StreamTag,
    pub handler: H,
}

/// Protocols by name, at most one spec per name.
///
/// Reads vastly outnumber writes, lookups during negotiation never contend
/// with each other.
pub struct ProtocolRegistry<H> {
    protocols: RwLock<HashMap<String, Arc<ProtocolSpec<H>>>>,
}

impl<H> Default for ProtocolRegistry<H> {
    fn default() -> Self {
        Self {
            protocols: RwLock::default(),
        }
    }
}

impl<H> fmt::Debug for ProtocolRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}

impl<H> ProtocolRegistry<H> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, spec: ProtocolSpec<H>) -> Result<(), RegistryError> {
        validate(&spec)?;

        match self.protocols.write().entry(spec.name.clone()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(spec.name)),
            Entry::Vacant(entry) => {
                let _ignored = entry.insert(Arc::new(spec));
                Ok(())
            }
        }
    }

    /// Swaps in a new spec for a protocol, returning the one it replaced.
    pub fn replace(
        &self,
        spec: ProtocolSpec<H>,
    ) -> Result<Option<Arc<ProtocolSpec<H>>>, RegistryError> {
        validate(&spec)?;

        Ok(self
            .protocols
            .write()
            .insert(spec.name.clone(), Arc::new(spec)))
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<ProtocolSpec<H>>> {
        self.protocols.read().get(name).cloned()
    }

    /// Registered `(name, version)` pairs, sorted by name.
    #[must_use]
    pub fn protocols(&self) -> Vec<(String, String)> {
        let mut protocols: Vec<_> = self
            .protocols
            .read()
            .values()
            .map(|spec| (spec.name.clone(), spec.version.clone()))
            .collect();

        protocols.sort();
        protocols
    }
}

impl<H: Clone> ProtocolRegistry<H> {
    /// Matches a request by protocol, then version, then stream name.
    pub fn resolve(
        &self,
        protocol: &str,
        version: &str,
        stream: &str,
    ) -> Result<Resolved<H>, NotSupported> {
        let Some(spec) = self.lookup(protocol) else {
            return Err(NotSupported::Protocol {
                protocol: protocol.to_owned(),
            });
        };

        if !is_compatible(version, &spec.version) {
            return Err(NotSupported::Version {
                protocol: protocol.to_owned(),
                requested: version.to_owned(),
                registered: spec.version.clone(),
            });
        }

        let Some(stream_spec) = spec.stream(stream) else {
            return Err(NotSupported::Stream {
                protocol: protocol.to_owned(),
                stream: stream.to_owned(),
            });
        };

        Ok(Resolved {
            tag: StreamTag::new(protocol, version, stream),
            handler: stream_spec.handler.clone(),
        })
    }
}

fn validate<H>(spec: &ProtocolSpec<H>) -> Result<(), RegistryError> {
    if spec.name.is_empty() {
        return Err(RegistryError::EmptyName);
    }

    if Version::parse(&spec.version).is_err() {
        return Err(RegistryError::InvalidVersion {
            name: spec.name.clone(),
            version: spec.version.clone(),
        });
    }

    for (idx, stream) in spec.streams.iter().enumerate() {
        if stream.name.is_empty() {
            return Err(RegistryError::EmptyStreamName(spec.name.clone()));
        }

        if spec.streams[..idx].iter().any(|s| s.name == stream.name) {
            return Err(RegistryError::DuplicateStream {
                name: spec.name.clone(),
                stream: stream.name.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn testing() -> ProtocolSpec<&'static str> {
        ProtocolSpec::new("testing", "2.3.4").with_stream("messages", "messages-handler")
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ProtocolRegistry::new();
        registry.register(testing()).unwrap();

        let spec = registry.lookup("testing").unwrap();
        assert_eq!(spec.version, "2.3.4");
        assert!(registry.lookup("other").is_none());
        assert_eq!(
            registry.protocols(),
            vec![("testing".to_owned(), "2.3.4".to_owned())]
        );
    }

    #[test]
    fn test_register_conflict() {
        let registry = ProtocolRegistry::new();
        registry.register(testing()).unwrap();

        assert_eq!(
            registry.register(testing()),
            Err(RegistryError::AlreadyRegistered("testing".to_owned()))
        );
    }

    #[test]
    fn test_replace() {
        let registry = ProtocolRegistry::new();

        assert!(registry.replace(testing()).unwrap().is_none());

        let previous = registry
            .replace(ProtocolSpec::new("testing", "2.4.0").with_stream("messages", "v2"))
            .unwrap()
            .unwrap();
        assert_eq!(previous.version, "2.3.4");

        let resolved = registry.resolve("testing", "2.4.0", "messages").unwrap();
        assert_eq!(resolved.handler, "v2");
    }

    #[test]
    fn test_register_rejects_invalid_specs() {
        let registry = ProtocolRegistry::<()>::new();

        assert_eq!(
            registry.register(ProtocolSpec::new("", "1.0.0")),
            Err(RegistryError::EmptyName)
        );
        assert_eq!(
            registry.register(ProtocolSpec::new("testing", "1.0")),
            Err(RegistryError::InvalidVersion {
                name: "testing".to_owned(),
                version: "1.0".to_owned(),
            })
        );
        assert_eq!(
            registry.register(ProtocolSpec::new("testing", "1.0.0").with_stream("", ())),
            Err(RegistryError::EmptyStreamName("testing".to_owned()))
        );
        assert_eq!(
            registry.register(
                ProtocolSpec::new("testing", "1.0.0")
                    .with_stream("messages", ())
                    .with_stream("messages", ())
            ),
            Err(RegistryError::DuplicateStream {
                name: "testing".to_owned(),
                stream: "messages".to_owned(),
            })
        );
        assert!(registry.protocols().is_empty());
    }

    #[test]
    fn test_resolve() {
        let registry = ProtocolRegistry::new();
        registry.register(testing()).unwrap();

        let resolved = registry.resolve("testing", "2.3.5-beta", "messages").unwrap();
        assert_eq!(resolved.handler, "messages-handler");
        assert_eq!(
            resolved.tag,
            StreamTag::new("testing", "2.3.5-beta", "messages")
        );
        assert_eq!(
            resolved.tag.to_string(),
            "/apiary/testing/2.3.5-beta/messages"
        );
    }

    #[test]
    fn test_resolve_not_supported() {
        let registry = ProtocolRegistry::new();
        registry.register(testing()).unwrap();

        assert_eq!(
            registry.resolve("testing-invalid", "2.3.4", "messages").unwrap_err(),
            NotSupported::Protocol {
                protocol: "testing-invalid".to_owned()
            }
        );
        assert_eq!(
            registry.resolve("testing", "2.4.0", "messages").unwrap_err(),
            NotSupported::Version {
                protocol: "testing".to_owned(),
                requested: "2.4.0".to_owned(),
                registered: "2.3.4".to_owned(),
            }
        );
        assert_eq!(
            registry
                .resolve("testing", "2.3.4", "messages-invalid")
                .unwrap_err(),
            NotSupported::Stream {
                protocol: "testing".to_owned(),
                stream: "messages-invalid".to_owned(),
            }
        );
    }

    #[test]
    fn test_resolve_checks_version_before_stream() {
        let registry = ProtocolRegistry::new();
        registry.register(testing()).unwrap();

        assert!(matches!(
            registry.resolve("testing", "3.0.0", "messages-invalid"),
            Err(NotSupported::Version { .. })
        ));
    }
}
