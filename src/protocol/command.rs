/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Request command types.
//!
//! A [`Command`] is the decoded form of one client request. It can be read
//! from two encodings: the compact delimited form stored in the command log,
//! and the structured JSON form carried on live request channels.

use super::codec::{CodecError, CompactReader, CompactRecord, CompactWriter};
use super::tag::{CommandTag, KEY_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier, rejecting the empty string.
            ///
            /// # Errors
            ///
            /// Returns [`CodecError::InvalidField`] if `id` is empty.
            pub fn new(id: impl Into<String>) -> Result<Self, CodecError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(CodecError::InvalidField {
                        field: stringify!($name),
                        value: id,
                        reason: "identifier must not be empty".to_string(),
                    });
                }
                Ok(Self(id))
            }

            /// Returns the identifier text.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = CodecError;

            fn try_from(id: String) -> Result<Self, Self::Error> {
                Self::new(id)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = CodecError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id! {
    /// Identifier of a market.
    MarketId
}

string_id! {
    /// Identifier of an order, unique within its market.
    OrderId
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Bid.
    Buy,
    /// Ask.
    Sell,
}

impl Side {
    /// Returns the opposite side.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "B",
            Self::Sell => "S",
        })
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "B" => Ok(Self::Buy),
            "S" => Ok(Self::Sell),
            other => Err(format!("expected B or S, got {other:?}")),
        }
    }
}

/// Request to open a new market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMarketReq {
    /// Market to create.
    pub market_id: MarketId,
    /// Client request id, echoed in the response.
    pub req_id: u64,
    /// Requesting user.
    pub user_id: u64,
    /// Instrument symbol traded in the market.
    pub symbol: String,
    /// Minimum price increment.
    pub tick_size: u64,
}

/// Request to submit a limit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitReq {
    /// Target market.
    pub market_id: MarketId,
    /// Client-assigned order id.
    pub order_id: OrderId,
    /// Client request id, echoed in the response.
    pub req_id: u64,
    /// Requesting user.
    pub user_id: u64,
    /// Order side.
    pub side: Side,
    /// Limit price in ticks.
    pub price: u64,
    /// Order quantity.
    pub quantity: u64,
}

/// Request to cancel a resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelReq {
    /// Target market.
    pub market_id: MarketId,
    /// Order to cancel.
    pub order_id: OrderId,
    /// Client request id, echoed in the response.
    pub req_id: u64,
    /// Requesting user.
    pub user_id: u64,
}

/// Request to change the price and quantity of a resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaceReq {
    /// Target market.
    pub market_id: MarketId,
    /// Order to replace.
    pub order_id: OrderId,
    /// Client request id, echoed in the response.
    pub req_id: u64,
    /// Requesting user.
    pub user_id: u64,
    /// New limit price in ticks.
    pub price: u64,
    /// New quantity.
    pub quantity: u64,
}

/// Query for a market's current details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketDetailsReq {
    /// Market to describe.
    pub market_id: MarketId,
    /// Client request id, echoed in the response.
    pub req_id: u64,
    /// Requesting user.
    pub user_id: u64,
}

/// Request for the engine to log a market's book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogReq {
    /// Market to log.
    pub market_id: MarketId,
    /// Client request id.
    pub req_id: u64,
    /// Requesting user.
    pub user_id: u64,
}

impl CompactRecord for CreateMarketReq {
    fn write_fields(&self, w: &mut CompactWriter) {
        w.push_str(self.market_id.as_str())
            .push(self.req_id)
            .push(self.user_id)
            .push_str(&self.symbol)
            .push(self.tick_size);
    }

    fn read_fields(r: &mut CompactReader) -> Result<Self, CodecError> {
        Ok(Self {
            market_id: r.parse("market_id")?,
            req_id: r.parse("req_id")?,
            user_id: r.parse("user_id")?,
            symbol: r.string("symbol")?,
            tick_size: r.parse("tick_size")?,
        })
    }
}

impl CompactRecord for SubmitReq {
    fn write_fields(&self, w: &mut CompactWriter) {
        w.push_str(self.market_id.as_str())
            .push_str(self.order_id.as_str())
            .push(self.req_id)
            .push(self.user_id)
            .push(self.side)
            .push(self.price)
            .push(self.quantity);
    }

    fn read_fields(r: &mut CompactReader) -> Result<Self, CodecError> {
        Ok(Self {
            market_id: r.parse("market_id")?,
            order_id: r.parse("order_id")?,
            req_id: r.parse("req_id")?,
            user_id: r.parse("user_id")?,
            side: r.parse("side")?,
            price: r.parse("price")?,
            quantity: r.parse("quantity")?,
        })
    }
}

impl CompactRecord for CancelReq {
    fn write_fields(&self, w: &mut CompactWriter) {
        w.push_str(self.market_id.as_str())
            .push_str(self.order_id.as_str())
            .push(self.req_id)
            .push(self.user_id);
    }

    fn read_fields(r: &mut CompactReader) -> Result<Self, CodecError> {
        Ok(Self {
            market_id: r.parse("market_id")?,
            order_id: r.parse("order_id")?,
            req_id: r.parse("req_id")?,
            user_id: r.parse("user_id")?,
        })
    }
}

impl CompactRecord for ReplaceReq {
    fn write_fields(&self, w: &mut CompactWriter) {
        w.push_str(self.market_id.as_str())
            .push_str(self.order_id.as_str())
            .push(self.req_id)
            .push(self.user_id)
            .push(self.price)
            .push(self.quantity);
    }

    fn read_fields(r: &mut CompactReader) -> Result<Self, CodecError> {
        Ok(Self {
            market_id: r.parse("market_id")?,
            order_id: r.parse("order_id")?,
            req_id: r.parse("req_id")?,
            user_id: r.parse("user_id")?,
            price: r.parse("price")?,
            quantity: r.parse("quantity")?,
        })
    }
}

impl CompactRecord for MarketDetailsReq {
    fn write_fields(&self, w: &mut CompactWriter) {
        w.push_str(self.market_id.as_str())
            .push(self.req_id)
            .push(self.user_id);
    }

    fn read_fields(r: &mut CompactReader) -> Result<Self, CodecError> {
        Ok(Self {
            market_id: r.parse("market_id")?,
            req_id: r.parse("req_id")?,
            user_id: r.parse("user_id")?,
        })
    }
}

impl CompactRecord for LogReq {
    fn write_fields(&self, w: &mut CompactWriter) {
        w.push_str(self.market_id.as_str())
            .push(self.req_id)
            .push(self.user_id);
    }

    fn read_fields(r: &mut CompactReader) -> Result<Self, CodecError> {
        Ok(Self {
            market_id: r.parse("market_id")?,
            req_id: r.parse("req_id")?,
            user_id: r.parse("user_id")?,
        })
    }
}

/// A decoded client request.
///
/// # Examples
///
/// ```
/// use exch_relay::protocol::{CancelReq, Command, CommandTag, MarketId, OrderId};
///
/// let cancel = Command::Cancel(CancelReq {
///     market_id: MarketId::new("mkt1").unwrap(),
///     order_id: OrderId::new("ord1").unwrap(),
///     req_id: 7,
///     user_id: 3,
/// });
/// assert_eq!(cancel.to_log_record(), "C:mkt1,ord1,7,3");
///
/// let back = Command::from_log_record("C:mkt1,ord1,7,3").unwrap();
/// assert_eq!(back, cancel);
/// assert_eq!(back.tag(), CommandTag::Cancel);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a market.
    CreateMarket(CreateMarketReq),
    /// Submit an order.
    Submit(SubmitReq),
    /// Cancel an order.
    Cancel(CancelReq),
    /// Replace an order.
    Replace(ReplaceReq),
    /// Query market details.
    MarketDetails(MarketDetailsReq),
    /// Log a market's book.
    Log(LogReq),
    /// Halt the engine.
    Halt,
}

impl Command {
    /// Returns this command's tag.
    #[must_use]
    pub fn tag(&self) -> CommandTag {
        match self {
            Self::CreateMarket(_) => CommandTag::CreateMarket,
            Self::Submit(_) => CommandTag::Submit,
            Self::Cancel(_) => CommandTag::Cancel,
            Self::Replace(_) => CommandTag::Replace,
            Self::MarketDetails(_) => CommandTag::MarketDetails,
            Self::Log(_) => CommandTag::Log,
            Self::Halt => CommandTag::Halt,
        }
    }

    /// Returns the market the command targets, if any.
    #[must_use]
    pub fn market_id(&self) -> Option<&MarketId> {
        match self {
            Self::CreateMarket(r) => Some(&r.market_id),
            Self::Submit(r) => Some(&r.market_id),
            Self::Cancel(r) => Some(&r.market_id),
            Self::Replace(r) => Some(&r.market_id),
            Self::MarketDetails(r) => Some(&r.market_id),
            Self::Log(r) => Some(&r.market_id),
            Self::Halt => None,
        }
    }

    /// Encodes the command body in compact form, without its tag.
    #[must_use]
    pub fn to_compact(&self) -> String {
        match self {
            Self::CreateMarket(r) => r.to_compact(),
            Self::Submit(r) => r.to_compact(),
            Self::Cancel(r) => r.to_compact(),
            Self::Replace(r) => r.to_compact(),
            Self::MarketDetails(r) => r.to_compact(),
            Self::Log(r) => r.to_compact(),
            Self::Halt => String::new(),
        }
    }

    /// Decodes a compact body for the given tag.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the body is not a valid record of that kind.
    pub fn from_compact(tag: CommandTag, body: &str) -> Result<Self, CodecError> {
        Ok(match tag {
            CommandTag::CreateMarket => Self::CreateMarket(CreateMarketReq::from_compact(body)?),
            CommandTag::Submit => Self::Submit(SubmitReq::from_compact(body)?),
            CommandTag::Cancel => Self::Cancel(CancelReq::from_compact(body)?),
            CommandTag::Replace => Self::Replace(ReplaceReq::from_compact(body)?),
            CommandTag::MarketDetails => Self::MarketDetails(MarketDetailsReq::from_compact(body)?),
            CommandTag::Log => Self::Log(LogReq::from_compact(body)?),
            CommandTag::Halt => {
                CompactReader::new(body)?.finish()?;
                Self::Halt
            }
        })
    }

    /// Encodes the command as a tagged log record: `<tag>:<compact body>`.
    #[must_use]
    pub fn to_log_record(&self) -> String {
        let body = self.to_compact();
        let mut record = String::with_capacity(body.len() + 2);
        record.push(self.tag().as_char());
        record.push(KEY_SEPARATOR);
        record.push_str(&body);
        record
    }

    /// Decodes a tagged log record.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingDelimiter`], [`CodecError::UnknownTag`] or a
    /// field-level [`CodecError`].
    pub fn from_log_record(record: &str) -> Result<Self, CodecError> {
        let (tag, body) = split_log_record(record)?;
        Self::from_compact(tag, body)
    }

    /// Encodes the command as a structured JSON payload.
    ///
    /// Halt carries no fields and encodes as `{}`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if serialization fails.
    pub fn to_structured(&self) -> Result<String, CodecError> {
        Ok(match self {
            Self::CreateMarket(r) => serde_json::to_string(r)?,
            Self::Submit(r) => serde_json::to_string(r)?,
            Self::Cancel(r) => serde_json::to_string(r)?,
            Self::Replace(r) => serde_json::to_string(r)?,
            Self::MarketDetails(r) => serde_json::to_string(r)?,
            Self::Log(r) => serde_json::to_string(r)?,
            Self::Halt => "{}".to_string(),
        })
    }

    /// Decodes a structured JSON payload for the given tag.
    ///
    /// The payload of a halt request is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if the payload does not have the shape of
    /// the tagged request.
    pub fn from_structured(tag: CommandTag, payload: &str) -> Result<Self, CodecError> {
        Ok(match tag {
            CommandTag::CreateMarket => Self::CreateMarket(serde_json::from_str(payload)?),
            CommandTag::Submit => Self::Submit(serde_json::from_str(payload)?),
            CommandTag::Cancel => Self::Cancel(serde_json::from_str(payload)?),
            CommandTag::Replace => Self::Replace(serde_json::from_str(payload)?),
            CommandTag::MarketDetails => Self::MarketDetails(serde_json::from_str(payload)?),
            CommandTag::Log => Self::Log(serde_json::from_str(payload)?),
            CommandTag::Halt => Self::Halt,
        })
    }
}

/// Splits a `<tag>:<body>` log record into its tag and body.
///
/// # Errors
///
/// Returns [`CodecError::MissingDelimiter`] when there is no separator and
/// [`CodecError::UnknownTag`] when the prefix is not a single known tag.
pub fn split_log_record(record: &str) -> Result<(CommandTag, &str), CodecError> {
    let (prefix, body) = record
        .split_once(KEY_SEPARATOR)
        .ok_or_else(|| CodecError::MissingDelimiter(record.to_string()))?;
    let mut chars = prefix.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok((CommandTag::try_from(c)?, body)),
        _ => Err(CodecError::UnknownTag(prefix.to_string())),
    }
}
