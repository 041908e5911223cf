#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use caffeine_blob as blob;

#[doc(inline)]
pub use caffeine_blas as blas;

#[doc(inline)]
pub use caffeine_layers as layers;
