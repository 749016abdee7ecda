use semver::Version;

/// Whether a peer asking for `requested` can be served by a handler
/// registered at `registered`.
///
/// A host advertises the highest minor it speaks for a major, so any
/// request at the same major and a lower or equal minor is accepted.
/// Patch, pre-release and build metadata must parse but never affect
/// the outcome. Malformed versions are never compatible.
#[must_use]
pub fn is_compatible(requested: &str, registered: &str) -> bool {
    let (Ok(requested), Ok(registered)) = (Version::parse(requested), Version::parse(registered))
    else {
        return false;
    };

    requested.major == registered.major && requested.minor <= registered.minor
}
