pub mod cascade;
pub mod owned_css;
pub mod prefixer;
pub mod selector;
pub mod stylesheet;
