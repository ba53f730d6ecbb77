//! The single verb a run applies to every selected engine.

use dx_engine::SourceOperation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Start,
    Stop,
    Enable,
    Disable,
    List,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Start => "start",
            Verb::Stop => "stop",
            Verb::Enable => "enable",
            Verb::Disable => "disable",
            Verb::List => "list",
        }
    }

    /// The engine-side operation, or `None` for the listing verb which has
    /// no job lifecycle.
    pub fn operation(self) -> Option<SourceOperation> {
        match self {
            Verb::Start => Some(SourceOperation::Start),
            Verb::Stop => Some(SourceOperation::Stop),
            Verb::Enable => Some(SourceOperation::Enable),
            Verb::Disable => Some(SourceOperation::Disable),
            Verb::List => None,
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do, and to which VDBs. Shared read-only by all workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    verb: Verb,
    objects: Vec<String>,
}

impl ActionRequest {
    /// Listing request; takes no object names.
    pub fn list() -> Self {
        Self {
            verb: Verb::List,
            objects: Vec::new(),
        }
    }

    /// A VDB operation on one or more named VDBs. Names are trimmed, empty
    /// names dropped, and duplicates collapsed keeping first occurrence.
    ///
    /// Returns `None` for `Verb::List` or when no usable name remains.
    pub fn on_objects<I, S>(verb: Verb, names: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if verb == Verb::List {
            return None;
        }
        let mut objects: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() && !objects.iter().any(|o| o == name) {
                objects.push(name.to_string());
            }
        }
        if objects.is_empty() {
            return None;
        }
        Some(Self { verb, objects })
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn objects(&self) -> &[String] {
        &self.objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_objects_trims_and_dedups() {
        let req = ActionRequest::on_objects(Verb::Stop, [" a ", "b", "a", ""]).unwrap();
        assert_eq!(req.verb(), Verb::Stop);
        assert_eq!(req.objects(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn on_objects_requires_a_name() {
        assert!(ActionRequest::on_objects(Verb::Start, Vec::<String>::new()).is_none());
        assert!(ActionRequest::on_objects(Verb::Start, ["  "]).is_none());
    }

    #[test]
    fn list_never_carries_objects() {
        assert!(ActionRequest::on_objects(Verb::List, ["x"]).is_none());
        assert!(ActionRequest::list().objects().is_empty());
        assert_eq!(Verb::List.operation(), None);
        assert_eq!(Verb::Disable.operation(), Some(SourceOperation::Disable));
    }
}
