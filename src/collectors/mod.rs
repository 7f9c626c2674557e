pub mod bench;
pub mod smart;
pub mod thermal;
