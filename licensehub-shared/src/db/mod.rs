/// Database layer for LicenseHub
///
/// - `pool`: PostgreSQL connection pool with a startup health check
/// - `migrations`: Embedded schema migrations
///
/// Row types live in the `models` module; transactional access goes through
/// `store::PgLicenseStore`.

pub mod migrations;
pub mod pool;
