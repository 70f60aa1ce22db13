/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Command type tags and channel keys.
//!
//! Every inbound request channel and every command-log record carries a
//! single-character tag identifying the command kind. [`CommandTag`] is the
//! closed set of those characters and [`ChannelKey`] is the parsed form of a
//! `<namespace>:<tag>` channel name.

use super::codec::CodecError;
use std::fmt;

/// Separator between a namespace and a tag, and between a log tag and its body.
pub const KEY_SEPARATOR: char = ':';

/// The single-character type tag of a [`Command`](super::Command).
///
/// # Examples
///
/// ```
/// use exch_relay::protocol::CommandTag;
///
/// assert_eq!(CommandTag::try_from('S').ok(), Some(CommandTag::Submit));
/// assert_eq!(CommandTag::Submit.as_char(), 'S');
/// assert!(CommandTag::try_from('X').is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandTag {
    /// `M`
    CreateMarket,
    /// `S`
    Submit,
    /// `C`
    Cancel,
    /// `R`
    Replace,
    /// `D`
    MarketDetails,
    /// `L`
    Log,
    /// `H`
    Halt,
}

impl CommandTag {
    /// All tags in declaration order.
    pub const ALL: [CommandTag; 7] = [
        Self::CreateMarket,
        Self::Submit,
        Self::Cancel,
        Self::Replace,
        Self::MarketDetails,
        Self::Log,
        Self::Halt,
    ];

    /// Returns the wire character for this tag.
    #[inline]
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::CreateMarket => 'M',
            Self::Submit => 'S',
            Self::Cancel => 'C',
            Self::Replace => 'R',
            Self::MarketDetails => 'D',
            Self::Log => 'L',
            Self::Halt => 'H',
        }
    }

    /// Returns `true` for the state-mutating kinds written to the command log.
    ///
    /// Market-details and log requests are read-only queries and halt is a
    /// control message; none of them are persisted, so none may appear in a
    /// replayed log.
    #[inline]
    #[must_use]
    pub const fn is_persistable(self) -> bool {
        matches!(
            self,
            Self::CreateMarket | Self::Submit | Self::Cancel | Self::Replace
        )
    }
}

impl TryFrom<char> for CommandTag {
    type Error = CodecError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            'M' => Ok(Self::CreateMarket),
            'S' => Ok(Self::Submit),
            'C' => Ok(Self::Cancel),
            'R' => Ok(Self::Replace),
            'D' => Ok(Self::MarketDetails),
            'L' => Ok(Self::Log),
            'H' => Ok(Self::Halt),
            other => Err(CodecError::UnknownTag(other.to_string())),
        }
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A parsed `<namespace>:<tag>` channel name.
///
/// The tag is kept as the raw string after the separator so that callers can
/// decide how to interpret it: inbound request keys resolve it to a
/// [`CommandTag`], outbound keys use their own tag set.
///
/// # Examples
///
/// ```
/// use exch_relay::protocol::{ChannelKey, CommandTag};
///
/// let key = ChannelKey::parse("EX_REQ:C").unwrap();
/// assert_eq!(key.namespace(), "EX_REQ");
/// assert_eq!(key.command_tag().ok(), Some(CommandTag::Cancel));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelKey<'a> {
    namespace: &'a str,
    tag: &'a str,
}

impl<'a> ChannelKey<'a> {
    /// Splits a channel name at its last separator.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedChannel`] when the name has no
    /// separator or an empty namespace.
    pub fn parse(channel: &'a str) -> Result<Self, CodecError> {
        match channel.rsplit_once(KEY_SEPARATOR) {
            Some((namespace, tag)) if !namespace.is_empty() => Ok(Self { namespace, tag }),
            _ => Err(CodecError::MalformedChannel(channel.to_string())),
        }
    }

    /// Returns the namespace part.
    #[must_use]
    pub fn namespace(&self) -> &'a str {
        self.namespace
    }

    /// Returns the raw tag part.
    #[must_use]
    pub fn raw_tag(&self) -> &'a str {
        self.tag
    }

    /// Resolves the tag part to a [`CommandTag`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownTag`] unless the tag is exactly one known
    /// command character.
    pub fn command_tag(&self) -> Result<CommandTag, CodecError> {
        let mut chars = self.tag.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => CommandTag::try_from(c),
            _ => Err(CodecError::UnknownTag(self.tag.to_string())),
        }
    }
}

/// Builds a `<namespace>:<tag>` channel name.
#[must_use]
pub fn channel_key(namespace: &str, tag: char) -> String {
    let mut key = String::with_capacity(namespace.len() + 2);
    key.push_str(namespace);
    key.push(KEY_SEPARATOR);
    key.push(tag);
    key
}

/// Builds the `<namespace>:*` pattern matching every channel in a namespace.
#[must_use]
pub fn namespace_pattern(namespace: &str) -> String {
    channel_key(namespace, '*')
}

/// Builds the `<market_id>:<order_id>` key identifying an order across markets.
///
/// # Examples
///
/// ```
/// use exch_relay::protocol::order_key;
///
/// assert_eq!(order_key("BTCUSD", "42"), "BTCUSD:42");
/// ```
#[must_use]
pub fn order_key(market_id: &str, order_id: &str) -> String {
    let mut key = String::with_capacity(market_id.len() + order_id.len() + 1);
    key.push_str(market_id);
    key.push(KEY_SEPARATOR);
    key.push_str(order_id);
    key
}
