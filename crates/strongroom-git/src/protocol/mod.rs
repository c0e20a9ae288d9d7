//! Smart transfer protocol
//!
//! - Packet-line framing (`pktline`)
//! - Ref resolution (`refs`) and advertisement (`advertise`)
//! - Upload-pack negotiation and pack streaming (`upload_pack`)
//! - The transport-facing client interface (`transfer`)

pub mod advertise;
pub mod pktline;
pub mod refs;
pub mod transfer;
pub mod upload_pack;

pub use advertise::{parse_advertisement, ReferenceAdvertiser, RemoteRefs};
pub use pktline::{Packet, PktLineReader, PktLineWriter};
pub use refs::{ReferenceResolver, ReferenceSet, HEAD_SYMBOLIC_DEPTH};
pub use transfer::{
    fetch_advertisement, fetch_pack, Method, Route, TransferClient, TransferRequest,
    TransferResponse, UPLOAD_PACK_SERVICE,
};
pub use upload_pack::{read_pack_response, UploadPack, UploadPackRequest};
