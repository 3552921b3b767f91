use std::fmt;

/// Error type for a section whose root is already served by the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSectionError {
    /// The root that was registered twice.
    pub root: String,
}

impl fmt::Display for DuplicateSectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "section with root {} already exists", self.root)
    }
}

impl std::error::Error for DuplicateSectionError {}
