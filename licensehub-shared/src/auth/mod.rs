/// Inbound request authentication
///
/// Users sign in through the external auth system, which issues HS256 JWTs
/// whose `sub` is the user id. This module only verifies those tokens.
///
/// # Modules
///
/// - [`jwt`]: Claims, token creation (tests and tooling) and validation
/// - [`middleware`]: Axum middleware that puts an [`middleware::AuthContext`]
///   into request extensions
///
/// # Example
///
/// ```no_run
/// use licensehub_shared::auth::jwt::{create_token, validate_token, Claims};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let claims = Claims::new(Uuid::new_v4(), Some("jane@example.com".to_string()));
/// let token = create_token(&claims, "a-secret-of-at-least-thirty-two-bytes")?;
/// let validated = validate_token(&token, "a-secret-of-at-least-thirty-two-bytes")?;
/// assert_eq!(validated.sub, claims.sub);
/// # Ok(())
/// # }
/// ```

pub mod jwt;
pub mod middleware;
