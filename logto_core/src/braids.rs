use aliri_braid::braid;
use std::fmt;

macro_rules! limited_reveal {
    ($ty:ty: $hidden:literal, $default:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    f.write_str("\"")?;
                    limited_reveal(&self.0, &mut *f, $default)?;
                    f.write_str("\"")
                } else {
                    f.write_str(concat!("***", $hidden, "***"))
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    limited_reveal(&self.0, &mut *f, usize::MAX)
                } else {
                    f.write_str(concat!("***", $hidden, "***"))
                }
            }
        }
    };
}

fn limited_reveal(unprotected: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    let max_len = f.width().unwrap_or(default_len);
    if max_len <= 1 {
        f.write_str("…")
    } else if max_len > unprotected.len() {
        f.write_str(unprotected)
    } else {
        match unprotected.char_indices().nth(max_len - 2) {
            Some((idx, c)) if idx + c.len_utf8() < unprotected.len() => {
                f.write_str(&unprotected[0..idx + c.len_utf8()])?;
                f.write_str("…")
            }
            _ => f.write_str(unprotected),
        }
    }
}

/// The ID of the Logto application acting as the OAuth2 client
#[braid(serde)]
pub struct AppId;

/// The secret of the Logto application
#[braid(serde, debug = "owned", display = "owned")]
pub struct AppSecret;

limited_reveal!(AppSecretRef: "APP SECRET", 5);

/// A bearer credential as issued in the `access_token` field of a token response
#[braid(serde, debug = "owned", display = "owned")]
pub struct BearerToken;

limited_reveal!(BearerTokenRef: "ACCESS TOKEN", 15);

/// A signed ID token carrying the identity claims of the signed-in user
#[braid(serde)]
pub struct IdToken;

/// A refresh token, which may be rotated by the provider on every use
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

limited_reveal!(RefreshTokenRef: "REFRESH TOKEN", 5);

/// An API resource indicator, used as the audience of an access token
#[braid(serde)]
pub struct Resource;

/// An OAuth2 scope
#[braid(serde)]
pub struct Scope;

/// The ID of an organization within a multi-tenant Logto deployment
#[braid(serde)]
pub struct OrganizationId;

/// The ID of a Logto user
#[braid(serde)]
pub struct UserId;
