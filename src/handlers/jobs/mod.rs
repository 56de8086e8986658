pub mod collection;
pub mod record;

// Re-export handler functions for use in routing
pub use collection::list as jobs_list;
pub use collection::list_scoped as jobs_list_scoped;
pub use collection::post as jobs_post;
pub use collection::post_scoped as jobs_post_scoped;
pub use collection::stats as jobs_stats;

pub use record::delete as job_delete;
pub use record::get as job_get;
pub use record::status as job_status;
