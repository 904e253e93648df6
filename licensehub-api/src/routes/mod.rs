/// API route handlers
///
/// - `health`: Health check endpoint
/// - `licenses`: Validation, license pool, knowledge resolution
/// - `teams`: Team consolidation and selection preview
/// - `sub_licenses`: Seat management for consolidated teams

pub mod health;
pub mod licenses;
pub mod sub_licenses;
pub mod teams;
