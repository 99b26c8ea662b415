pub mod outdated;
pub mod reporter;
