pub mod exchange;
pub mod gtk;
pub mod igtk;
pub mod ptk;
