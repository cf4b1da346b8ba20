pub mod exit;
pub mod run;

pub use exit::{AbortKind, Access, DataAbort, ExitKind, RecExit};
pub use run::Run;
