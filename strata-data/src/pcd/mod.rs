//! PCD (Point Cloud Data) file loading and parsing

mod header;
mod loader;

pub use header::{PcdEncoding, PcdHeader};
pub use loader::{PcdCloud, load_pcd, parse_pcd};
