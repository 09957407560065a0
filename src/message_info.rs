//! Structured message identity and its wire header encoding.
//!
//! Grounded in `header_util.rs` (header construction helpers).

use std::fmt;
use std::str::FromStr;

/// Whether a message is targeted at a single owning endpoint (`Command`) or
/// broadcast to subscribers (`Event`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Targets a specific owning endpoint.
    Command,
    /// Broadcast to subscribers.
    Event,
}

impl fmt::Display for MessageKind {
    /// Emits the lowercase wire token (`command` or `event`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::Command => "command",
            Self::Event => "event",
        };
        f.write_str(token)
    }
}

impl FromStr for MessageKind {
    type Err = ();

    /// Parses case-insensitively; any other token fails.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("command") {
            Ok(Self::Command)
        } else if s.eq_ignore_ascii_case("event") {
            Ok(Self::Event)
        } else {
            Err(())
        }
    }
}

/// The structured type identifier carried on the wire under the `x-type`
/// header (see [`crate::headers::MESSAGE_TYPE`]).
///
/// Equality and hashing consider only `(kind, endpoint, name, major)` —
/// minor and patch are compatibility metadata that never affect lookup, so
/// that a consumer on `1.4.0` can still be matched by a producer declaring
/// `1.1.0`.
#[derive(Clone, Debug)]
pub struct MessageInfo {
    /// Command or event.
    pub kind: MessageKind,
    /// The owning endpoint's name (for commands) or source endpoint (for
    /// events).
    pub endpoint: String,
    /// The message's name, distinct from its endpoint.
    pub name: String,
    /// Major version; part of identity.
    pub major: u32,
    /// Minor version; compatibility metadata only.
    pub minor: u32,
    /// Patch version; compatibility metadata only.
    pub patch: u32,
}

impl MessageInfo {
    /// Creates a new `MessageInfo`.
    #[must_use]
    pub fn new(
        kind: MessageKind,
        endpoint: impl Into<String>,
        name: impl Into<String>,
        major: u32,
        minor: u32,
        patch: u32,
    ) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            name: name.into(),
            major,
            minor,
            patch,
        }
    }

    /// Renders the canonical header string, e.g.
    /// `endpoint=alpha, type=event, name=alpha-event, version=1.0.0`.
    ///
    /// When `include_version` is `false` the trailing `version=` segment is
    /// omitted; this form is used as the subscription key, which is
    /// version-agnostic (see [`crate::broker::endpoint::InMemoryEndpoint`]).
    #[must_use]
    pub fn to_string(&self, include_version: bool) -> String {
        let mut out = format!(
            "endpoint={}, type={}, name={}",
            self.endpoint, self.kind, self.name
        );
        if include_version {
            out.push_str(&format!(
                ", version={}.{}.{}",
                self.major, self.minor, self.patch
            ));
        }
        out
    }

    /// The version-agnostic subscription key: the header form without the
    /// `version=` segment.
    #[must_use]
    pub fn subscription_key(&self) -> String {
        self.to_string(false)
    }

    /// Parses a canonical header string.
    ///
    /// Accepts `endpoint=`, `type=`, `name=`, and an optional `version=`
    /// segment in any order, separated by commas. Whitespace is tolerated
    /// only around the separators; the grammar is otherwise strict and
    /// rejects whitespace inside a value. Returns `None` — never an error —
    /// for any malformed input; callers that need a [`crate::error::PolyBusError`]
    /// translate the `None` into [`crate::error::PolyBusError::MessageNotFound`]
    /// at the registry boundary.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        if header.trim().is_empty() {
            return None;
        }

        let mut endpoint = None;
        let mut kind = None;
        let mut name = None;
        let mut version = None;

        for segment in header.split(',') {
            let segment = segment.trim();
            if segment.is_empty() {
                return None;
            }
            let (key, value) = segment.split_once('=')?;
            let key = key.trim();
            let value = value.trim();
            if value.is_empty() || value.chars().any(char::is_whitespace) {
                return None;
            }
            match key {
                "endpoint" if endpoint.is_none() => endpoint = Some(value.to_owned()),
                "type" if kind.is_none() => kind = Some(value.parse::<MessageKind>().ok()?),
                "name" if name.is_none() => name = Some(value.to_owned()),
                "version" if version.is_none() => version = Some(parse_version(value)?),
                _ => return None,
            }
        }

        let (major, minor, patch) = version.unwrap_or((0, 0, 0));
        Some(Self {
            kind: kind?,
            endpoint: endpoint?,
            name: name?,
            major,
            minor,
            patch,
        })
    }
}

/// Parses a strict `major.minor.patch` decimal triple.
fn parse_version(value: &str) -> Option<(u32, u32, u32)> {
    let mut parts = value.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

impl PartialEq for MessageInfo {
    /// Compares `(kind, endpoint, name, major)` only.
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.endpoint == other.endpoint
            && self.name == other.name
            && self.major == other.major
    }
}

impl Eq for MessageInfo {}

impl std::hash::Hash for MessageInfo {
    /// Hashes `(kind, endpoint, name, major)` only, matching [`PartialEq`].
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.endpoint.hash(state);
        self.name.hash(state);
        self.major.hash(state);
    }
}

impl fmt::Display for MessageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string(true))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    fn sample() -> MessageInfo {
        MessageInfo::new(MessageKind::Command, "user-service", "CreateUser", 1, 2, 3)
    }

    #[rstest]
    #[case(
        "endpoint=user-service, type=Command, name=CreateUser, version=1.2.3",
        MessageKind::Command,
        "user-service",
        "CreateUser",
        1,
        2,
        3
    )]
    #[case(
        "endpoint=notification-service, type=Event, name=UserCreated, version=2.0.1",
        MessageKind::Event,
        "notification-service",
        "UserCreated",
        2,
        0,
        1
    )]
    #[case(
        "endpoint=order-service, type=command, name=PlaceOrder, version=1.0.0",
        MessageKind::Command,
        "order-service",
        "PlaceOrder",
        1,
        0,
        0
    )]
    fn parses_valid_headers(
        #[case] header: &str,
        #[case] kind: MessageKind,
        #[case] endpoint: &str,
        #[case] name: &str,
        #[case] major: u32,
        #[case] minor: u32,
        #[case] patch: u32,
    ) {
        let info = MessageInfo::parse(header).expect("should parse");
        assert_eq!(info.kind, kind);
        assert_eq!(info.endpoint, endpoint);
        assert_eq!(info.name, name);
        assert_eq!(info.major, major);
        assert_eq!(info.minor, minor);
        assert_eq!(info.patch, patch);
    }

    #[rstest]
    #[case("")]
    #[case("invalid header")]
    #[case("endpoint=test")]
    #[case("endpoint=test, type=Command")]
    #[case("endpoint=test, type=Command, name=Test, version=invalid")]
    #[case("endpoint=test, type=Command, name=Test, version=")]
    #[case("endpoint=test, type=Command, name=Test, version=1.0")]
    #[case("type=Command, name=Test, version=1.0.0")]
    #[case("endpoint=test, type=InvalidType, name=Test, version=1.0.0")]
    fn rejects_invalid_headers(#[case] header: &str) {
        assert!(MessageInfo::parse(header).is_none());
    }

    #[test]
    fn header_round_trips() {
        let info = sample();
        let header = info.to_string(true);
        let parsed = MessageInfo::parse(&header).expect("should parse");
        assert_eq!(info, parsed);
        assert_eq!(info.minor, parsed.minor);
        assert_eq!(info.patch, parsed.patch);
    }

    #[test]
    fn equality_ignores_minor_and_patch() {
        let a = MessageInfo::new(MessageKind::Command, "user-service", "CreateUser", 1, 2, 3);
        let b = MessageInfo::new(MessageKind::Command, "user-service", "CreateUser", 1, 9, 9);
        assert_eq!(a, b);
    }

    #[test]
    fn equality_considers_major_endpoint_name_kind() {
        let base = sample();
        let diff_major = MessageInfo::new(MessageKind::Command, "user-service", "CreateUser", 2, 2, 3);
        let diff_kind = MessageInfo::new(MessageKind::Event, "user-service", "CreateUser", 1, 2, 3);
        let diff_endpoint = MessageInfo::new(MessageKind::Command, "order-service", "CreateUser", 1, 2, 3);
        let diff_name = MessageInfo::new(MessageKind::Command, "user-service", "UpdateUser", 1, 2, 3);
        assert_ne!(base, diff_major);
        assert_ne!(base, diff_kind);
        assert_ne!(base, diff_endpoint);
        assert_ne!(base, diff_name);
    }

    #[test]
    fn subscription_key_omits_version() {
        let info = sample();
        assert_eq!(
            info.subscription_key(),
            "endpoint=user-service, type=command, name=CreateUser"
        );
    }

    proptest! {
        #[test]
        fn header_round_trips_for_arbitrary_valid_values(
            endpoint in "[a-z][a-z0-9-]{0,15}",
            name in "[a-zA-Z][a-zA-Z0-9]{0,15}",
            is_event in any::<bool>(),
            major in 0u32..1000,
            minor in 0u32..1000,
            patch in 0u32..1000,
        ) {
            let kind = if is_event { MessageKind::Event } else { MessageKind::Command };
            let info = MessageInfo::new(kind, endpoint, name, major, minor, patch);
            let parsed = MessageInfo::parse(&info.to_string(true)).expect("should parse");
            prop_assert_eq!(&info, &parsed);
            prop_assert_eq!(info.minor, parsed.minor);
            prop_assert_eq!(info.patch, parsed.patch);
        }
    }
}
