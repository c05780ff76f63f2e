pub mod event_repository;
