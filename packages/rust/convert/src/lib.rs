//! Format converters: manifest → EPUB and EPUB → MOBI.
//!
//! Both stages sit behind a trait so the build pipeline can be driven by the
//! default command-line tools or by in-process stand-ins.

mod command;
pub mod container;
pub mod device;

use std::future::Future;
use std::path::Path;

use quillbook_shared::Result;

pub use container::CommandContainerConverter;
pub use device::{CommandDeviceConverter, check_device_output};

/// Produces an EPUB from a book manifest.
pub trait ContainerConverter {
    /// Convert the manifest at `manifest` into an EPUB at `output`.
    fn convert(&self, manifest: &Path, output: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// Produces a device-format (MOBI) ebook from an EPUB.
pub trait DeviceConverter {
    /// Convert the EPUB at `input` into a MOBI at `output`.
    fn convert(&self, input: &Path, output: &Path) -> impl Future<Output = Result<()>> + Send;
}
