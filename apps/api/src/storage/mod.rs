// External persistence collaborators: the JSON document store holding
// extract and employee records, and the blob store holding source RFPs and
// the résumé template. Drivers only see the traits.

pub mod blobs;
pub mod documents;
#[cfg(test)]
pub mod memory;
pub mod repository;
