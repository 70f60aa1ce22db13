/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Wire protocol: commands, channel keys and outbound messages.
//!
//! Two text encodings coexist and are not interchangeable:
//!
//! - the **compact** form, `<tag>:<f1>,<f2>,...`, written to the durable
//!   command log and read back during bootstrap replay;
//! - the **structured** form, self-describing JSON, carried on live request
//!   channels and used for every outbound response and event.

pub mod codec;
pub mod command;
pub mod outbound;
pub mod tag;

pub use codec::{CodecError, CompactReader, CompactRecord, CompactWriter};
pub use command::{
    CancelReq, Command, CreateMarketReq, LogReq, MarketDetailsReq, MarketId, OrderId, ReplaceReq,
    Side, SubmitReq, split_log_record,
};
pub use outbound::{
    BookLevel, BookUpdateEvt, CancelResp, CreateMarketResp, DEFAULT_EVENT_NAMESPACE,
    DEFAULT_RESPONSE_NAMESPACE, Fill, MarketCreatedEvt, MarketDetailsResp, Outbound, OutboundKind,
    OutboundNamespace, ReplaceResp, ResponseStatus, SubmitResp, TopOfBookEvt,
};
pub use tag::{ChannelKey, CommandTag, channel_key, namespace_pattern, order_key};
