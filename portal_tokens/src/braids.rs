use aliri_braid::braid;
use std::fmt;

/// Masks a credential braid in formatted output
///
/// Plain `{}` and `{:?}` print only the label, as `<access token>`. Alternate
/// debug (`{:#?}`) shows the first few characters, or as many as the format
/// width asks for. Alternate display (`{:#}`) writes the credential in full,
/// for putting it on the wire.
macro_rules! masked {
    ($ty:ty: $label:literal, shows $visible:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    let visible = f.width().unwrap_or($visible);
                    write!(f, "{:?}", Prefix(&self.0, visible))
                } else {
                    f.write_str(concat!("<", $label, ">"))
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    f.write_str(&self.0)
                } else {
                    f.write_str(concat!("<", $label, ">"))
                }
            }
        }
    };
}

/// The first `.1` characters of a credential, quoted, with an ellipsis if cut
struct Prefix<'a>(&'a str, usize);

impl fmt::Debug for Prefix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Prefix(value, visible) = *self;
        match value.char_indices().nth(visible) {
            Some((end, _)) => write!(f, "\"{}…\"", &value[..end]),
            None => write!(f, "\"{}\"", value),
        }
    }
}

/// Identifies the application to the portal
#[braid(serde)]
pub struct ClientId;

/// Proves the application's identity to the portal's token endpoint
#[braid(serde, debug = "owned", display = "owned")]
pub struct ClientSecret;

masked!(ClientSecretRef: "client secret", shows 0);

/// Bearer credential attached to every portal API call
///
/// The portal signals expiry by rejecting a call with error code `4010`.
#[braid(serde, debug = "owned", display = "owned")]
pub struct AccessToken;

masked!(AccessTokenRef: "access token", shows 12);

/// Exchanged at the token endpoint for a fresh credential pair
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

masked!(RefreshTokenRef: "refresh token", shows 4);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_prints_only_its_label() {
        let token = AccessToken::from_static("super-secret-access-token-value");
        assert_eq!(format!("{:?}", &*token), "<access token>");
        assert_eq!(format!("{}", &*token), "<access token>");
        assert_eq!(format!("{:?}", token), "<access token>");
    }

    #[test]
    fn alternate_debug_shows_a_prefix() {
        let token = RefreshToken::from_static("abcdefghij");
        assert_eq!(format!("{:#?}", &*token), "\"abcd…\"");
    }

    #[test]
    fn width_widens_the_prefix() {
        let token = RefreshToken::from_static("abcdefghij");
        assert_eq!(format!("{:#7?}", &*token), "\"abcdefg…\"");
        assert_eq!(format!("{:#20?}", &*token), "\"abcdefghij\"");
    }

    #[test]
    fn client_secret_shows_nothing_by_default() {
        let secret = ClientSecret::from_static("abcdefghij");
        assert_eq!(format!("{:#?}", &*secret), "\"…\"");
    }

    #[test]
    fn alternate_display_writes_the_credential() {
        let secret = ClientSecret::from_static("abcdefghij");
        assert_eq!(format!("{:#}", &*secret), "abcdefghij");
    }
}
