pub mod pg_notifier;
