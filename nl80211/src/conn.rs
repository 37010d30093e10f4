//! The process-wide nl80211 socket: command dispatch with per-command
//! cancellation, and multicast event delivery.
//!
//! All callers run on the same single-threaded executor. Completions are
//! `oneshot` receivers; cancelling a command removes its pending entry before
//! `cancel` returns, so a completion can never fire afterwards.

use std::cell::Cell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use failure::{bail, format_err};
use futures::channel::{mpsc, oneshot};
use futures::{pin_mut, select, FutureExt, StreamExt};
use log::{debug, warn};
use netlink_packet_core::{
    NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST,
};
use netlink_packet_generic::ctrl::nlas::{GenlCtrlAttrs, McastGrpAttrs};
use netlink_packet_generic::ctrl::{GenlCtrl, GenlCtrlCmd};
use netlink_packet_generic::GenlMessage;
use netlink_sys::{protocols::NETLINK_GENERIC, Socket};
use tokio::io::unix::AsyncFd;

use crate::attr::Nl80211Attr;
use crate::cmd::Nl80211Cmd;
use crate::message::Nl80211Message;

pub type CommandId = u32;

/// Outcome of one command: the response messages, or the kernel's errno.
pub type CmdResult = Result<Vec<Nl80211Message>, i32>;

/// A demultiplexed multicast notification.
#[derive(Debug, Clone)]
pub struct Nl80211Event {
    pub cmd: Nl80211Cmd,
    pub attrs: Vec<Nl80211Attr>,
}

impl Nl80211Event {
    pub fn ifindex(&self) -> Option<u32> {
        self.attrs.iter().filter_map(|a| match a {
            Nl80211Attr::Ifindex(idx) => Some(*idx),
            _ => None,
        }).next()
    }
}

enum ConnRequest {
    Send {
        seq: u32,
        cmd: Nl80211Cmd,
        attrs: Vec<Nl80211Attr>,
        dump: bool,
        reply: oneshot::Sender<CmdResult>,
    },
    Cancel {
        seq: u32,
    },
}

#[derive(Clone)]
pub struct Handle {
    requests: mpsc::UnboundedSender<ConnRequest>,
    next_seq: Rc<Cell<u32>>,
}

impl Handle {
    fn allocate_seq(&self) -> u32 {
        let seq = self.next_seq.get();
        self.next_seq.set(seq.wrapping_add(1).max(1));
        seq
    }

    fn submit(
        &self,
        cmd: Nl80211Cmd,
        attrs: Vec<Nl80211Attr>,
        dump: bool,
    ) -> (CommandId, oneshot::Receiver<CmdResult>) {
        let seq = self.allocate_seq();
        let (reply, receiver) = oneshot::channel();
        let _ = self.requests.unbounded_send(ConnRequest::Send { seq, cmd, attrs, dump, reply });
        (seq, receiver)
    }

    /// Issues a command; the returned id may be passed to `cancel`.
    pub fn send(
        &self,
        cmd: Nl80211Cmd,
        attrs: Vec<Nl80211Attr>,
    ) -> (CommandId, oneshot::Receiver<CmdResult>) {
        self.submit(cmd, attrs, false)
    }

    /// Issues a dump request, e.g. GET_INTERFACE for all netdevs.
    pub fn dump(
        &self,
        cmd: Nl80211Cmd,
        attrs: Vec<Nl80211Attr>,
    ) -> (CommandId, oneshot::Receiver<CmdResult>) {
        self.submit(cmd, attrs, true)
    }

    /// Guarantees the command's completion does not fire after return.
    pub fn cancel(&self, id: CommandId) {
        let _ = self.requests.unbounded_send(ConnRequest::Cancel { seq: id });
    }

    /// Asks the kernel to forward management frames whose payload starts
    /// with `match_prefix` for the given interface.
    pub fn register_frame(
        &self,
        ifindex: u32,
        frame_type: u16,
        match_prefix: &[u8],
    ) -> (CommandId, oneshot::Receiver<CmdResult>) {
        self.send(
            Nl80211Cmd::RegisterFrame,
            vec![
                Nl80211Attr::Ifindex(ifindex),
                Nl80211Attr::FrameType(frame_type),
                Nl80211Attr::FrameMatch(match_prefix.to_vec()),
            ],
        )
    }
}

/// Opens the nl80211 socket, resolves the family and joins the `config`,
/// `mlme` and `scan` multicast groups. Returns the command handle, the
/// multicast event stream, and the connection future the caller must drive.
pub async fn new_connection() -> Result<
    (Handle, mpsc::UnboundedReceiver<Nl80211Event>, impl std::future::Future<Output = ()>),
    failure::Error,
> {
    let mut socket = Socket::new(NETLINK_GENERIC).map_err(map_io)?;
    socket.bind_auto().map_err(map_io)?;

    // Family resolution runs blocking; the socket only turns non-blocking
    // once it joins the main loop.
    let (family_id, groups) = resolve_family(&socket, "nl80211")?;
    for group in ["config", "mlme", "scan"].iter() {
        match groups.get(*group) {
            Some(id) => socket.add_membership(*id).map_err(map_io)?,
            None => warn!("nl80211 family does not advertise multicast group '{}'", group),
        }
    }
    socket.set_non_blocking(true).map_err(map_io)?;
    let fd = AsyncFd::new(socket).map_err(map_io)?;

    let (requests_tx, requests_rx) = mpsc::unbounded();
    let (events_tx, events_rx) = mpsc::unbounded();
    let handle = Handle { requests: requests_tx, next_seq: Rc::new(Cell::new(1)) };
    let driver = run_connection(fd, family_id, requests_rx, events_tx);
    Ok((handle, events_rx, driver))
}

fn map_io(e: io::Error) -> failure::Error {
    format_err!("netlink socket error: {}", e)
}

fn resolve_family(
    socket: &Socket,
    name: &str,
) -> Result<(u16, HashMap<String, u32>), failure::Error> {
    let genl = GenlMessage::from_payload(GenlCtrl {
        cmd: GenlCtrlCmd::GetFamily,
        nlas: vec![GenlCtrlAttrs::FamilyName(name.to_string())],
    });
    let mut header = NetlinkHeader::default();
    header.flags = NLM_F_REQUEST | NLM_F_ACK;
    header.sequence_number = 1;
    let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(genl));
    packet.finalize();
    let mut buf = vec![0u8; packet.buffer_len()];
    packet.serialize(&mut buf[..]);
    socket.send(&buf[..], 0).map_err(map_io)?;

    let mut family_id = None;
    let mut groups = HashMap::new();
    loop {
        let mut rbuf = Vec::with_capacity(8192);
        socket.recv(&mut rbuf, 0).map_err(map_io)?;
        for message in split_messages(&rbuf[..]) {
            let message =
                NetlinkMessage::<GenlMessage<GenlCtrl>>::deserialize(message)
                    .map_err(|e| format_err!("invalid CTRL message: {}", e))?;
            match message.payload {
                NetlinkPayload::InnerMessage(genl) => {
                    for nla in genl.payload.nlas {
                        match nla {
                            GenlCtrlAttrs::FamilyId(id) => family_id = Some(id),
                            GenlCtrlAttrs::McastGroups(mcast_groups) => {
                                for group in mcast_groups {
                                    let mut name = None;
                                    let mut id = None;
                                    for attr in group {
                                        match attr {
                                            McastGrpAttrs::Name(n) => name = Some(n),
                                            McastGrpAttrs::Id(i) => id = Some(i),
                                        }
                                    }
                                    if let (Some(name), Some(id)) = (name, id) {
                                        groups.insert(name, id);
                                    }
                                }
                            }
                            _ => (),
                        }
                    }
                }
                NetlinkPayload::Error(e) => {
                    if let Some(code) = e.code {
                        bail!("CTRL_CMD_GETFAMILY failed: errno {}", code);
                    }
                    // The ack terminates the exchange.
                    let family_id =
                        family_id.ok_or_else(|| format_err!("no family id in response"))?;
                    return Ok((family_id, groups));
                }
                _ => (),
            }
        }
        if let Some(id) = family_id {
            // Some kernels omit the ack for GETFAMILY replies.
            return Ok((id, groups));
        }
    }
}

/// Netlink datagrams may batch several messages; split on the embedded
/// lengths.
pub(crate) fn split_messages(buf: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut offset = 0;
    std::iter::from_fn(move || {
        if offset + 16 > buf.len() {
            return None;
        }
        let len = u32::from_ne_bytes([
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ]) as usize;
        if len < 16 || offset + len > buf.len() {
            return None;
        }
        let message = &buf[offset..offset + len];
        offset += (len + 3) & !3;
        Some(message)
    })
}

struct Pending {
    reply: oneshot::Sender<CmdResult>,
    partial: Vec<Nl80211Message>,
}

async fn run_connection(
    fd: AsyncFd<Socket>,
    family_id: u16,
    requests: mpsc::UnboundedReceiver<ConnRequest>,
    events: mpsc::UnboundedSender<Nl80211Event>,
) {
    let mut pending: HashMap<u32, Pending> = HashMap::new();
    let mut requests = requests.fuse();

    loop {
        let recv = recv_datagram(&fd).fuse();
        pin_mut!(recv);
        select! {
            request = requests.next() => match request {
                Some(ConnRequest::Send { seq, cmd, attrs, dump, reply }) => {
                    match send_command(&fd, family_id, seq, cmd, attrs, dump).await {
                        Ok(()) => {
                            pending.insert(seq, Pending { reply, partial: vec![] });
                        }
                        Err(e) => {
                            warn!("failed to send nl80211 command {:?}: {}", cmd, e);
                            let _ = reply.send(Err(libc_eio()));
                        }
                    }
                }
                Some(ConnRequest::Cancel { seq }) => {
                    pending.remove(&seq);
                }
                None => break,
            },
            result = recv => match result {
                Ok(datagram) => {
                    dispatch_datagram(&datagram[..], &mut pending, &events);
                }
                Err(e) => {
                    warn!("nl80211 socket error: {}; connection terminating", e);
                    break;
                }
            },
        }
    }
    // Outstanding commands resolve as I/O errors when the connection dies.
    for (_, entry) in pending.drain() {
        let _ = entry.reply.send(Err(libc_eio()));
    }
}

fn libc_eio() -> i32 {
    5
}

async fn send_command(
    fd: &AsyncFd<Socket>,
    family_id: u16,
    seq: u32,
    cmd: Nl80211Cmd,
    attrs: Vec<Nl80211Attr>,
    dump: bool,
) -> io::Result<()> {
    let mut genl = GenlMessage::from_payload(Nl80211Message::new(cmd, attrs));
    genl.set_resolved_family_id(family_id);
    let mut header = NetlinkHeader::default();
    header.flags = if dump { NLM_F_REQUEST | NLM_F_ACK | NLM_F_DUMP } else { NLM_F_REQUEST | NLM_F_ACK };
    header.sequence_number = seq;
    let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(genl));
    packet.finalize();
    let mut buf = vec![0u8; packet.buffer_len()];
    packet.serialize(&mut buf[..]);

    loop {
        let mut guard = fd.writable().await?;
        match guard.try_io(|inner| inner.get_ref().send(&buf[..], 0)) {
            Ok(result) => {
                result?;
                return Ok(());
            }
            Err(_would_block) => continue,
        }
    }
}

async fn recv_datagram(fd: &AsyncFd<Socket>) -> io::Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::with_capacity(16384);
    loop {
        let mut guard = fd.readable().await?;
        buf.clear();
        match guard.try_io(|inner| inner.get_ref().recv(&mut buf, 0)) {
            Ok(result) => {
                result?;
                return Ok(buf);
            }
            Err(_would_block) => continue,
        }
    }
}

fn dispatch_datagram(
    buf: &[u8],
    pending: &mut HashMap<u32, Pending>,
    events: &mpsc::UnboundedSender<Nl80211Event>,
) {
    for bytes in split_messages(buf) {
        let message = match NetlinkMessage::<GenlMessage<Nl80211Message>>::deserialize(bytes) {
            Ok(message) => message,
            Err(e) => {
                debug!("ignoring unparseable netlink message: {}", e);
                continue;
            }
        };
        let seq = message.header.sequence_number;

        if pending.contains_key(&seq) {
            match message.payload {
                // Replies accumulate until the ack (or Done, for dumps)
                // resolves the command.
                NetlinkPayload::InnerMessage(genl) => {
                    let entry = pending.get_mut(&seq).expect("checked above");
                    entry.partial.push(genl.payload);
                }
                NetlinkPayload::Error(e) => {
                    let entry = pending.remove(&seq).expect("checked above");
                    let result = match e.code {
                        Some(code) => Err(code.get()),
                        None => Ok(entry.partial),
                    };
                    let _ = entry.reply.send(result);
                }
                NetlinkPayload::Done(_) => {
                    let entry = pending.remove(&seq).expect("checked above");
                    let _ = entry.reply.send(Ok(entry.partial));
                }
                _ => (),
            }
        } else {
            if let NetlinkPayload::InnerMessage(genl) = message.payload {
                let event = Nl80211Event { cmd: genl.payload.cmd, attrs: genl.payload.attrs };
                let _ = events.unbounded_send(event);
            }
        }
    }
}
