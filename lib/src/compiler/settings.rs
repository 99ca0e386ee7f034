use super::Error;
use crate::vm::{ArtifactName, Name};

pub struct Settings {
    /// Name of the generated artifact, written as `scripts/hello`
    pub artifact_name: ArtifactName,

    /// Source file name, recorded in descriptors and errors
    pub source_file: String,

    /// Which cache categories use dynamically linked call sites instead of fields
    pub dynamic_linkage: DynamicLinkage,

    /// Top-level statements compiled into one routine before chaining to a successor
    pub chained_compile_line_count: usize,

    /// Array literals with at least this many (literal) elements are built by builder routines
    pub array_chunk_threshold: usize,

    /// Elements populated by each array builder routine
    pub array_chunk_size: usize,

    /// Hash literals with at least this many (literal) keys are built by builder routines
    pub hash_chunk_threshold: usize,

    /// Pairs populated by each hash builder routine
    pub hash_chunk_size: usize,

    /// Compile rescue/ensure regions of heap-backed bodies into routines of their own
    ///
    /// Even when this is off, regions that start with a non-empty operand stack are outlined
    /// (catching a signal clears the operand stack).
    pub outline_exception_regions: bool,

    /// Emit line markers
    pub line_numbers: bool,
}

/// Per-category switches between field caching and dynamically linked call sites
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DynamicLinkage {
    pub constants: bool,
    pub literals: bool,
    pub regexps: bool,
    pub call_sites: bool,
    pub scopes: bool,
}

impl DynamicLinkage {
    pub const NONE: DynamicLinkage = DynamicLinkage {
        constants: false,
        literals: false,
        regexps: false,
        call_sites: false,
        scopes: false,
    };

    pub const ALL: DynamicLinkage = DynamicLinkage {
        constants: true,
        literals: true,
        regexps: true,
        call_sites: true,
        scopes: true,
    };
}

impl Settings {
    pub const CHAINED_COMPILE_LINE_COUNT: usize = 500;
    pub const LITERAL_CHUNK_THRESHOLD: usize = 100;
    pub const HASH_CHUNK_THRESHOLD: usize = 50;

    pub fn new(
        artifact_name: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Result<Settings, Error> {
        Ok(Settings {
            artifact_name: ArtifactName::from_string(artifact_name.into())
                .map_err(Error::MalformedName)?,
            source_file: source_file.into(),
            dynamic_linkage: DynamicLinkage::NONE,
            chained_compile_line_count: Self::CHAINED_COMPILE_LINE_COUNT,
            array_chunk_threshold: Self::LITERAL_CHUNK_THRESHOLD,
            array_chunk_size: Self::LITERAL_CHUNK_THRESHOLD,
            hash_chunk_threshold: Self::HASH_CHUNK_THRESHOLD,
            hash_chunk_size: Self::LITERAL_CHUNK_THRESHOLD,
            outline_exception_regions: true,
            line_numbers: true,
        })
    }
}
