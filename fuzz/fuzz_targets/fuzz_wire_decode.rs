#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use netprobe_core::wire::{
    BounceBackHeader, ClientHeaderAck, L4sAck, L4sForwardDatagram, ServerRelayReport,
    TcpBurstHeader, TestHeader, UdpDatagramHeader,
};

// Every `decode` checks `buf.remaining()` before reading a single byte off it
// (see `wire::require`), so none of these calls should ever panic regardless of
// how short or malformed `data` is.
fuzz_target!(|data: &[u8]| {
    let mut buf = Bytes::copy_from_slice(data);
    let _ = UdpDatagramHeader::decode(&mut buf.clone());
    let _ = TcpBurstHeader::decode(&mut buf.clone());
    let _ = BounceBackHeader::decode(&mut buf.clone());
    let _ = ClientHeaderAck::decode(&mut buf.clone());
    let _ = ServerRelayReport::decode(&mut buf.clone());
    let _ = L4sForwardDatagram::decode(&mut buf.clone());
    let _ = L4sAck::decode(&mut buf.clone());
    let _ = TestHeader::decode(&mut buf);
});
