//! protocol - wire message taxonomy and framing
//!
//! every message is a JSON record with a `header` discriminator field,
//! sent over TCP with a 4-byte big-endian length prefix. the set of
//! headers is closed; an unknown header or malformed payload is a hard
//! parse error carrying the offending raw text.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// fixed width of the length prefix in bytes
pub const HEADER_SIZE: usize = 4;

/// registered participant as distributed in the roster
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    /// 0 for the dealer, 1..=N for players in registration order
    pub sequence: u32,
    /// unique within the session
    pub nickname: String,
    /// hex session public key, unique within the session
    pub public_key: String,
}

/// one entry of the coordinator's hash-chained audit log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub sequence: u64,
    /// unix seconds
    pub timestamp: u64,
    /// sha-256 of the serialized previous entry, empty for genesis
    pub prev_hash: String,
    /// serialized message text that was logged
    pub text: String,
    /// coordinator signature over the canonical entry fields
    pub signature: String,
}

/// terminal session status carried by `GAMEOVER`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    /// deck validated and winners resolved
    Completed,
    /// a participant disconnected mid-game
    PeerLeft,
    /// signature or deck validation failure
    Aborted,
}

/// the closed set of wire messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "header")]
pub enum Message {
    /// challenge-response authentication against the identity key
    #[serde(rename = "AUTH")]
    Authenticate {
        /// hex identity public key the sender claims
        identity_key: String,
        /// filled in by the coordinator on the first round trip
        #[serde(default, skip_serializing_if = "Option::is_none")]
        challenge: Option<String>,
        /// hex signature over the challenge, second round trip
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<String>,
        #[serde(default)]
        success: bool,
    },

    /// session registration with nickname and per-session public key
    #[serde(rename = "REGISTER")]
    Register {
        nickname: String,
        /// hex session public key, distinct from the identity key
        session_key: String,
        identity_key: String,
        /// hex signature binding nickname and keys, made with the
        /// session key to prove possession
        signature: String,
        #[serde(default)]
        success: bool,
        /// assigned on success; 0 is reserved for the dealer
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence: Option<u32>,
    },

    /// game parameters, sent after a successful registration
    #[serde(rename = "GAMEINFO")]
    GameInfo {
        sequence: u32,
        card_size: u32,
        deck_size: u32,
    },

    /// roster query; `response` is filled by the coordinator. also
    /// broadcast (coordinator-signed) to everyone at game start
    #[serde(rename = "GETUSERS")]
    GetUsers {
        identity_key: String,
        signature: String,
        #[serde(default)]
        response: Vec<UserData>,
    },

    /// audit log query; `response` is filled by the coordinator
    #[serde(rename = "GETLOG")]
    GetLog {
        identity_key: String,
        signature: String,
        #[serde(default)]
        response: Vec<LogEntry>,
    },

    /// party status broadcast on every roster change
    #[serde(rename = "PARTY")]
    PartyUpdate {
        current: u32,
        maximum: u32,
        dealer: bool,
    },

    /// instructs the dealer to generate and commit the initial deck
    #[serde(rename = "GENDECK")]
    GenerateDeck,

    /// the deck pipeline message, relayed hop by hop
    #[serde(rename = "GENCARD")]
    GenerateCard {
        /// number of layers applied so far; the coordinator routes to
        /// the participant with this sequence, wrapping to the dealer
        sequence: u32,
        /// hex encrypted slots, one per deck value
        deck: Vec<String>,
        /// hex signatures, one per applied layer, oldest first
        signatures: Vec<String>,
        /// true once the pipeline has returned to the dealer
        #[serde(default)]
        done: bool,
    },

    /// asks the participant with `sequence` to reveal its deck key
    #[serde(rename = "DECKKEYREQ")]
    DeckKeyRequest { sequence: u32 },

    /// a revealed deck key, broadcast to every other participant
    #[serde(rename = "DECKKEYRES")]
    DeckKeyResponse {
        sequence: u32,
        /// hex symmetric key, doubles as the permutation seed
        key: String,
        /// hex signature over the reveal by the sender's session key
        signature: String,
    },

    /// session end: completion, mid-game disconnect, or abort
    #[serde(rename = "GAMEOVER")]
    GameOver {
        status: GameStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl Message {
    /// whether the coordinator records this message in the audit log.
    /// control and administrative traffic is logged; informational
    /// query responses are not
    pub fn is_loggable(&self) -> bool {
        !matches!(self, Message::GetUsers { .. } | Message::GetLog { .. })
    }

    /// serialize to the JSON wire form
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// parse from raw payload bytes; failures name the offending text
    pub fn decode(raw: &[u8]) -> Result<Message> {
        serde_json::from_slice(raw)
            .map_err(|_| Error::BadFormat(String::from_utf8_lossy(raw).into_owned()))
    }
}

/// send one framed message
pub async fn send_msg<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Message) -> Result<()> {
    let payload = msg.encode()?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// receive one framed message. `Ok(None)` signals orderly peer
/// shutdown: EOF at a frame boundary or a zero-length frame. EOF
/// partway through the prefix or payload is a truncated frame, not
/// orderly shutdown
pub async fn recv_msg<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Message>> {
    let mut header = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        match reader.read(&mut header[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => return Err(Error::PeerDisconnected),
            n => filled += n,
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    if len == 0 {
        return Ok(None);
    }

    let mut payload = vec![0u8; len];
    match reader.read_exact(&mut payload).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::PeerDisconnected)
        }
        Err(e) => return Err(e.into()),
    }
    Ok(Some(Message::decode(&payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let msg = Message::GenerateCard {
            sequence: 2,
            deck: vec!["aabb".into(), "ccdd".into()],
            signatures: vec!["0102".into()],
            done: false,
        };
        let bytes = msg.encode().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"header\":\"GENCARD\""));
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_unit_variant_round_trip() {
        let bytes = Message::GenerateDeck.encode().unwrap();
        assert_eq!(Message::decode(&bytes).unwrap(), Message::GenerateDeck);
    }

    #[test]
    fn test_unknown_header_names_raw_text() {
        let raw = br#"{"header":"BOGUS","x":1}"#;
        match Message::decode(raw) {
            Err(Error::BadFormat(text)) => assert!(text.contains("BOGUS")),
            other => panic!("expected BadFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_loggable_split() {
        let query = Message::GetLog {
            identity_key: "aa".into(),
            signature: "bb".into(),
            response: vec![],
        };
        assert!(!query.is_loggable());
        assert!(Message::GenerateDeck.is_loggable());
        assert!(Message::PartyUpdate { current: 1, maximum: 2, dealer: true }.is_loggable());
    }

    #[tokio::test]
    async fn test_framing_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let msg = Message::PartyUpdate { current: 2, maximum: 3, dealer: true };
        send_msg(&mut a, &msg).await.unwrap();
        let got = recv_msg(&mut b).await.unwrap();
        assert_eq!(got, Some(msg));
    }

    #[tokio::test]
    async fn test_closed_stream_is_none() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        assert!(recv_msg(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_length_prefix_is_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0u8, 0]).await.unwrap();
        drop(a);
        assert!(matches!(recv_msg(&mut b).await, Err(Error::PeerDisconnected)));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&8u32.to_be_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);
        assert!(matches!(recv_msg(&mut b).await, Err(Error::PeerDisconnected)));
    }
}
