// newsletter-listener: command line entry point of the newsletter runner.
// Depends on every other crate of the workspace.
//
// Architecture:
//   main → Runner::execute_command → run / schedule / next / validate / artifacts
//   run      → TriggerEvaluator::dispatch → JobDispatcher::run_now → JobRunner
//   schedule → Scheduler loop → TriggerEvaluator::next_fire_after → JobDispatcher::dispatch

pub mod command_settings;
pub mod job_dispatcher;
pub mod runner;
pub mod scheduler;
pub mod trigger;
