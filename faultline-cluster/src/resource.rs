//! Parsing of the cluster manager's resource listing.

/// One configured resource, parsed from a `Resource:` listing line of
/// whitespace-separated `key=value` tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterResource {
    /// Resource id.
    pub id: String,
    /// Clone instance id; equals `id` for plain primitives.
    pub clone_id: String,
    /// Resource agent class.
    pub rclass: String,
    /// Resource kind (`primitive`, `clone`, ...).
    pub rtype: String,
    /// Node currently hosting the resource, if any.
    pub host: Option<String>,
    /// Whether the cluster manages this resource.
    pub managed: bool,
    /// Whether at most one instance may be active.
    pub unique: bool,
}

impl ClusterResource {
    /// Parse one listing line. Lines that do not start with `Resource:`
    /// or lack an id yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("Resource:") {
            return None;
        }

        let mut id = None;
        let mut clone_id = None;
        let mut rclass = String::new();
        let mut rtype = String::new();
        let mut host = None;
        let mut managed = false;
        let mut unique = false;

        for token in tokens {
            let (key, value) = token.split_once('=')?;
            match key {
                "id" => id = Some(value.to_string()),
                "clone_id" => clone_id = Some(value.to_string()),
                "class" => rclass = value.to_string(),
                "type" => rtype = value.to_string(),
                "host" => host = Some(value.to_string()),
                "managed" => managed = value == "1" || value == "true",
                "unique" => unique = value == "1" || value == "true",
                _ => {}
            }
        }

        let id = id?;
        Some(Self {
            clone_id: clone_id.unwrap_or_else(|| id.clone()),
            id,
            rclass,
            rtype,
            host,
            managed,
            unique,
        })
    }
}
