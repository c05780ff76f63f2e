pub mod calendar_store;
pub mod candidate_generator;
pub mod conflict_detector;
pub mod intent_source;
pub mod notifier;
pub mod resolution_planner;
pub mod schedule_utils;
pub mod scheduling_service;
pub mod settings_service;
pub mod slot_ranker;
pub mod slot_scoring;
