pub mod clean_bucket;
pub mod copy_files;
