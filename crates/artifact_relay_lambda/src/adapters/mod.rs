pub mod cfn_response;
pub mod fetch;
pub mod object_store;
pub mod s3;
