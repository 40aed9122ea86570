pub mod binary;
pub mod classifier;
pub mod detect;
pub mod diagnostics;
pub mod header;
pub mod key;
pub mod locator;
pub mod reader;
pub mod sections;
pub mod signatures;
pub mod version;

pub use binary::*;
pub use classifier::VersionClassifier;
pub use detect::*;
pub use diagnostics::{Diagnostics, LogDiagnostics, Silent};
pub use header::ProtectedHeader;
pub use key::ResolvedKey;
pub use locator::*;
pub use reader::{ImageReader, ReadError};
pub use sections::*;
pub use signatures::*;
pub use version::*;
