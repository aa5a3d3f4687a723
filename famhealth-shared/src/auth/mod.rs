/// Authentication utilities
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and length rules
/// - [`jwt`]: access/refresh token issue and validation
/// - [`middleware`]: bearer-token middleware and the [`middleware::AuthContext`] it injects
///
/// # Example
///
/// ```
/// use famhealth_shared::auth::jwt::{issue_token_pair, validate_refresh_token};
/// use famhealth_shared::auth::password::{hash_password, verify_password};
/// use uuid::Uuid;
///
/// let hash = hash_password("hunter22").unwrap();
/// assert!(verify_password("hunter22", &hash).unwrap());
///
/// let secret = "documentation-secret-of-at-least-32-bytes";
/// let pair = issue_token_pair(Uuid::new_v4(), "ann@example.com", secret).unwrap();
/// assert!(validate_refresh_token(&pair.refresh_token, secret).is_ok());
/// ```

pub mod jwt;
pub mod middleware;
pub mod password;
