//! Robust Security Network element and its suite selectors.

pub mod akm;
pub mod cipher;
pub mod rsne;
pub mod suite_selector;

pub use suite_selector::OUI;
