use thiserror::Error;

/// Fatal compilation errors. This is a batch compiler: there are no
/// retries, and no output is produced when any of these occur.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("invalid optimization level {0}; valid levels are 0 through 5")]
    InvalidOptLevel(u32),

    #[error("global clock is not supported (process `{0}`)")]
    GlobalClock(String),

    #[error("init sync rule survived process lowering (process `{0}`)")]
    InitSyncSurvived(String),

    #[error("packed memory cell survived unpacking (cell `{0}`)")]
    PackedMemorySurvived(String),

    #[error("unsupported internal cell `{0}`")]
    UnsupportedCell(String),

    #[error("can't handle partially selected module `{0}`")]
    PartialSelection(String),

    #[error("recursive instantiation of module `{0}`")]
    RecursiveInstantiation(String),

    #[error("split interface output requires an interface filename")]
    MissingInterfaceName,
}
