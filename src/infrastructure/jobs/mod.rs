pub mod pg_job_queue;
