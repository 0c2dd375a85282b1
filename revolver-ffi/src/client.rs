//! Lifecycle and I/O surface: the exported `p2p_*` operations.

use std::ffi::c_char;

use multiaddr::Multiaddr;
use revolver_p2p::{Client, ShutdownFn};

use crate::config::{P2pConfig, translate};
use crate::ffi::{
    FfiResult, P2pMessage, catch, catch_async, message_from_bytes, set_last_error, to_c_string,
};
use crate::registry::registry;

// ---------------------------------------------------------------------------
// Address list wire format
// ---------------------------------------------------------------------------

/// Join addresses with a single 0x00 separator, final separator trimmed.
/// An empty list encodes to exactly zero bytes; consumers splitting on
/// the separator must treat a zero-length buffer as the empty list, not
/// as one empty address.
pub(crate) fn encode_address_list(addrs: &[Multiaddr]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, addr) in addrs.iter().enumerate() {
        if i > 0 {
            out.push(0x00);
        }
        out.extend_from_slice(addr.to_string().as_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Create a client from the flat configuration and write its reference
/// into `out_ref`. Returns 0 on success; on failure returns -1 with the
/// cause readable via [`p2p_last_error_message`], and nothing is
/// registered.
///
/// [`p2p_last_error_message`]: crate::ffi::p2p_last_error_message
#[unsafe(no_mangle)]
pub unsafe extern "C" fn p2p_new(cfg: *const P2pConfig, out_ref: *mut i32) -> i32 {
    catch_async(|| async {
        if cfg.is_null() {
            return Err("null config pointer".into());
        }
        if out_ref.is_null() {
            return Err("null output pointer".into());
        }

        let native = unsafe { translate(&*cfg) }?;
        let log_file = native.log_writer.file();

        let (client, shutdown) = Client::new(native).await?;

        // Release = shutdown, then flush the log file when one was
        // opened for this client.
        let release: ShutdownFn = match log_file {
            Some(file) => Box::new(move || {
                shutdown();
                let _ = file.sync_all();
            }),
            None => shutdown,
        };

        let reference = registry().register(client, release);
        unsafe {
            *out_ref = reference;
        }
        Ok(())
    })
}

/// Shut the client down and release its resources. Runs the stored
/// release function exactly once; a second call returns -1 ("already
/// shut down") and disturbs no other handle.
#[unsafe(no_mangle)]
pub extern "C" fn p2p_shutdown(reference: i32) -> i32 {
    catch(|| registry().get(reference)?.retire())
}

// ---------------------------------------------------------------------------
// Payload I/O
// ---------------------------------------------------------------------------

/// Submit the message bytes to the client's outbound channel. The bytes
/// are copied before the call returns; the caller keeps ownership of
/// `msg`. Blocks until the channel accepts the payload.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn p2p_send(reference: i32, msg: *const P2pMessage) -> i32 {
    catch_async(|| async move {
        let entry = registry().get(reference)?;
        if msg.is_null() {
            return Err("null message pointer".into());
        }
        let msg = unsafe { &*msg };
        let payload = if msg.data_size == 0 || msg.data.is_null() {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(msg.data, msg.data_size) }.to_vec()
        };
        entry.live_client()?.send(payload).await?;
        Ok(())
    })
}

/// Block until the client's inbound channel yields exactly one message,
/// then write a caller-owned copy into `out`. A zero-length message is
/// valid. Free the result with [`p2p_free_message`].
///
/// [`p2p_free_message`]: crate::ffi::p2p_free_message
#[unsafe(no_mangle)]
pub unsafe extern "C" fn p2p_receive(reference: i32, out: *mut *mut P2pMessage) -> i32 {
    catch_async(|| async move {
        if out.is_null() {
            return Err("null output pointer".into());
        }
        let entry = registry().get(reference)?;
        let payload = entry
            .live_client()?
            .recv()
            .await
            .ok_or("client shut down")?;
        unsafe {
            *out = message_from_bytes(&payload);
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Write the client's address list into `out` as a null-separated,
/// trimmed byte sequence. Zero known addresses yield a zero-length
/// message. Free the result with [`p2p_free_message`].
///
/// [`p2p_free_message`]: crate::ffi::p2p_free_message
#[unsafe(no_mangle)]
pub unsafe extern "C" fn p2p_addresses(reference: i32, out: *mut *mut P2pMessage) -> i32 {
    catch(|| {
        if out.is_null() {
            return Err("null output pointer".into());
        }
        let entry = registry().get(reference)?;
        let encoded = encode_address_list(&entry.live_client()?.addresses());
        unsafe {
            *out = message_from_bytes(&encoded);
        }
        Ok(())
    })
}

/// The client identifier as a fresh null-terminated string, or null on
/// error. Free with [`p2p_free_string`].
///
/// [`p2p_free_string`]: crate::ffi::p2p_free_string
#[unsafe(no_mangle)]
pub extern "C" fn p2p_id(reference: i32) -> *mut c_char {
    let result = (|| -> FfiResult<*mut c_char> {
        let entry = registry().get(reference)?;
        Ok(to_c_string(entry.live_client()?.id()))
    })();
    match result {
        Ok(ptr) => ptr,
        Err(e) => {
            set_last_error(e.to_string());
            std::ptr::null_mut()
        }
    }
}

/// Non-blocking snapshot of an integer counter; -1 on error.
fn snapshot(reference: i32, read: impl FnOnce(&Client) -> usize) -> i32 {
    let result = (|| -> FfiResult<usize> {
        let entry = registry().get(reference)?;
        Ok(read(entry.live_client()?))
    })();
    match result {
        Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
        Err(e) => {
            set_last_error(e.to_string());
            -1
        }
    }
}

/// Number of peers the client is currently connected to; -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn p2p_peer_count(reference: i32) -> i32 {
    snapshot(reference, Client::peer_count)
}

/// Number of streams the client currently has open; -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn p2p_stream_count(reference: i32) -> i32 {
    snapshot(reference, Client::stream_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::ConfigStrings;
    use crate::ffi::{p2p_free_message, p2p_free_string, p2p_last_error_length, p2p_malloc_message};
    use std::ffi::CStr;

    fn message_bytes(msg: *mut P2pMessage) -> Vec<u8> {
        let view = unsafe { &*msg };
        if view.data.is_null() {
            assert_eq!(view.data_size, 0);
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(view.data, view.data_size) }.to_vec()
        }
    }

    /// Independent splitter for the wire format. A zero-length buffer is
    /// the empty list, not one empty address.
    fn decode_address_list(encoded: &[u8]) -> Vec<String> {
        if encoded.is_empty() {
            return Vec::new();
        }
        encoded
            .split(|b| *b == 0x00)
            .map(|part| String::from_utf8(part.to_vec()).expect("utf8"))
            .collect()
    }

    #[test]
    fn empty_address_list_round_trips_through_the_wire_format() {
        let encoded = encode_address_list(&[]);
        assert!(encoded.is_empty(), "empty list encodes to zero bytes");
        assert!(decode_address_list(&encoded).is_empty());
    }

    #[test]
    fn address_list_round_trips_through_the_wire_format() {
        let addrs: Vec<Multiaddr> = vec![
            "/ip4/10.0.0.1/tcp/4001".parse().expect("addr"),
            "/ip4/10.0.0.2/tcp/4002".parse().expect("addr"),
            "/dns4/seed.example.com/tcp/4003".parse().expect("addr"),
        ];
        let encoded = encode_address_list(&addrs);
        assert_ne!(encoded.last(), Some(&0x00), "final separator is trimmed");

        let decoded = decode_address_list(&encoded);
        let expected: Vec<String> = addrs.iter().map(ToString::to_string).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn full_lifecycle_over_the_c_surface() {
        // Client A, peer discovery disabled.
        let strings_a = ConfigStrings::new("ffi-e2e", &[]);
        let flat_a = strings_a.config(4201);
        let mut ref_a: i32 = -1;
        assert_eq!(unsafe { p2p_new(&flat_a, &mut ref_a) }, 0);
        assert!(ref_a >= 0);

        // A's listen address, read back through the wire format.
        let mut msg: *mut P2pMessage = std::ptr::null_mut();
        assert_eq!(unsafe { p2p_addresses(ref_a, &mut msg) }, 0);
        let seed = String::from_utf8(message_bytes(msg)).expect("utf8");
        unsafe { p2p_free_message(msg) };
        assert_eq!(seed, "/ip4/127.0.0.1/tcp/4201");

        // Client B, seeded with A's address.
        let strings_b = ConfigStrings::new("ffi-e2e", &[seed]);
        let flat_b = strings_b.config(4202);
        let mut ref_b: i32 = -1;
        assert_eq!(unsafe { p2p_new(&flat_b, &mut ref_b) }, 0);
        assert_ne!(ref_a, ref_b);

        assert_eq!(p2p_peer_count(ref_b), 1);
        assert_eq!(p2p_stream_count(ref_b), 1);

        let id = p2p_id(ref_b);
        assert!(!id.is_null());
        assert_eq!(unsafe { CStr::from_ptr(id) }.to_bytes().len(), 64);
        unsafe { p2p_free_string(id) };

        // A sends 5 bytes; B receives them byte-identical.
        let outgoing = p2p_malloc_message(5);
        unsafe { std::ptr::copy_nonoverlapping(b"hello".as_ptr(), (*outgoing).data, 5) };
        assert_eq!(unsafe { p2p_send(ref_a, outgoing) }, 0);
        unsafe { p2p_free_message(outgoing) };

        let mut incoming: *mut P2pMessage = std::ptr::null_mut();
        assert_eq!(unsafe { p2p_receive(ref_b, &mut incoming) }, 0);
        assert_eq!(message_bytes(incoming), b"hello");
        unsafe { p2p_free_message(incoming) };

        // Shutdown runs once; the second call is a distinguished error.
        assert_eq!(p2p_shutdown(ref_b), 0);
        assert_eq!(p2p_shutdown(ref_b), -1);
        assert_eq!(p2p_peer_count(ref_b), -1);

        // A is untouched by B's retirement.
        assert_eq!(p2p_peer_count(ref_a), 0);
        assert_eq!(p2p_shutdown(ref_a), 0);
    }

    #[test]
    fn addressless_client_reports_an_empty_list() {
        let strings = ConfigStrings::new("ffi-no-addr", &[]);
        let mut flat = strings.config(0);
        flat.ip = strings.empty.as_ptr();

        let mut reference: i32 = -1;
        assert_eq!(unsafe { p2p_new(&flat, &mut reference) }, 0);

        let mut msg: *mut P2pMessage = std::ptr::null_mut();
        assert_eq!(unsafe { p2p_addresses(reference, &mut msg) }, 0);
        assert!(message_bytes(msg).is_empty());
        unsafe { p2p_free_message(msg) };

        assert_eq!(p2p_shutdown(reference), 0);
    }

    #[test]
    fn concurrent_creation_issues_distinct_usable_references() {
        // Address-less clients: no listen address, so no port clashes.
        let threads: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    let strings = ConfigStrings::new("ffi-concurrent", &[]);
                    let mut flat = strings.config(0);
                    flat.ip = strings.empty.as_ptr();
                    let mut reference: i32 = -1;
                    assert_eq!(unsafe { p2p_new(&flat, &mut reference) }, 0);
                    reference
                })
            })
            .collect();
        let mut refs: Vec<i32> = threads
            .into_iter()
            .map(|t| t.join().expect("thread"))
            .collect();

        // The shared table issues each reference exactly once; the
        // {0..n-1} density itself is pinned on an isolated registry in
        // the registry tests.
        refs.sort_unstable();
        let mut unique = refs.clone();
        unique.dedup();
        assert_eq!(unique, refs, "no reference is issued twice");
        assert_eq!(refs.len(), 8);

        for &reference in &refs {
            assert!(reference >= 0);
            let id = p2p_id(reference);
            assert!(!id.is_null());
            unsafe { p2p_free_string(id) };
            assert_eq!(p2p_shutdown(reference), 0);
        }
    }

    #[test]
    fn invalid_references_fail_without_crashing() {
        assert_eq!(p2p_shutdown(-7), -1);
        assert!(p2p_last_error_length() > 0);
        assert_eq!(p2p_peer_count(1_000_000), -1);
        assert_eq!(p2p_stream_count(1_000_000), -1);
        assert!(p2p_id(1_000_000).is_null());

        let mut msg: *mut P2pMessage = std::ptr::null_mut();
        assert_eq!(unsafe { p2p_addresses(1_000_000, &mut msg) }, -1);
        assert!(msg.is_null());
        assert_eq!(unsafe { p2p_receive(1_000_000, &mut msg) }, -1);
        assert_eq!(unsafe { p2p_send(1_000_000, std::ptr::null()) }, -1);
    }

    #[test]
    fn construction_failures_issue_no_reference() {
        let strings = ConfigStrings::new("ffi-bad-seed", &["junk".to_owned()]);
        let flat = strings.config(4211);
        let mut reference: i32 = -1;
        assert_eq!(unsafe { p2p_new(&flat, &mut reference) }, -1);
        assert_eq!(reference, -1, "no reference on failure");
        assert!(p2p_last_error_length() > 0);

        assert_eq!(unsafe { p2p_new(std::ptr::null(), &mut reference) }, -1);
        assert_eq!(unsafe { p2p_new(&flat, std::ptr::null_mut()) }, -1);
        assert_eq!(reference, -1);
    }
}
