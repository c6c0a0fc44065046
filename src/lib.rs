pub mod error;
pub mod util;
pub mod header;
pub mod section;
pub mod registry;
pub mod layout;
pub mod mirror;
pub mod param;
pub mod xclbin;

pub use error::{Result, XclBinError};
pub use header::{Axlf, AxlfHeader, XclBinMode};
pub use section::{FormatType, Section, SectionKind};
pub use registry::{SectionId, SectionRegistry};
pub use param::ParameterSectionData;
pub use xclbin::{ReadOptions, WriteOptions, XclBin};
