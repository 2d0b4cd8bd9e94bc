//! coordinator - relay and session authority
//!
//! accepts connections, runs challenge-response authentication,
//! registers exactly one dealer and up to N players, relays the deck
//! pipeline by sequence number and audit-logs every loggable message.
//! the coordinator never decrypts deck contents; it only inspects
//! `sequence`/`done` to pick the next hop.
//!
//! this module is transport-free: `handle` and `disconnect` return
//! `Outbound` effects for the network layer to execute, so all state
//! mutation happens in a single owner in arrival order.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::audit::{entries_digest, AuditLog};
use crate::config::GameConfig;
use crate::crypto::{random_challenge, verify_hex, SessionKeys};
use crate::error::{Error, Result};
use crate::game::{query_digest, register_digest, roster_digest};
use crate::protocol::{GameStatus, Message, UserData};

/// opaque connection handle assigned by the network layer
pub type ConnId = u64;

/// effect for the network layer to execute. connection-fatal errors
/// are not an effect: they surface as `Err` from `handle`, which the
/// network layer maps to a close
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    /// write a message to one connection
    Send(ConnId, Message),
    /// the session is over; stop accepting and tear down
    Shutdown,
}

/// relay/session state machine
pub struct Coordinator {
    config: GameConfig,
    keys: SessionKeys,
    log: AuditLog,
    /// at most one dealer, sequence 0
    dealer: Option<(ConnId, UserData)>,
    /// registered players keyed by connection
    players: HashMap<ConnId, UserData>,
    /// pending challenges keyed by claimed identity key
    challenges: HashMap<String, String>,
    /// authorized identity key per connection
    authorized: HashMap<ConnId, String>,
    /// registration freezes once the game starts
    playing: bool,
}

impl Coordinator {
    pub fn new(config: GameConfig, keys: SessionKeys) -> Self {
        let log = AuditLog::new(&keys);
        Self {
            config,
            keys,
            log,
            dealer: None,
            players: HashMap::new(),
            challenges: HashMap::new(),
            authorized: HashMap::new(),
            playing: false,
        }
    }

    /// public key participants verify the roster and audit log with
    pub fn public_key(&self) -> String {
        self.keys.public_hex()
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.log
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// whether a new connection may join. refused once playing
    pub fn accept(&mut self, conn: ConnId) -> Result<()> {
        if self.playing {
            return Err(Error::OutOfTurn(format!(
                "connection {conn} refused: session already playing"
            )));
        }
        Ok(())
    }

    /// dispatch one inbound message. errors are fatal to that
    /// connection (or to the session, for mid-game failures); the
    /// network layer maps them to closes
    pub fn handle(&mut self, conn: ConnId, msg: Message) -> Result<Vec<Outbound>> {
        let loggable = msg.is_loggable();
        let out = match msg.clone() {
            Message::Authenticate { identity_key, challenge, response, .. } => {
                self.authenticate(conn, identity_key, challenge, response)?
            }
            Message::Register { nickname, session_key, identity_key, signature, .. } => {
                self.register(conn, nickname, session_key, identity_key, signature)?
            }
            Message::GetUsers { identity_key, signature, .. } => {
                self.query_users(conn, &identity_key, &signature)?
            }
            Message::GetLog { identity_key, signature, .. } => {
                self.query_log(conn, &identity_key, &signature)?
            }
            Message::GenerateCard { sequence, done, .. } => {
                self.relay_deck(conn, msg.clone(), sequence, done)?
            }
            Message::DeckKeyResponse { .. } => self.relay_reveal(conn, msg.clone())?,
            Message::GameOver { status, detail } => self.game_over(conn, status, detail)?,
            other => {
                return Err(Error::OutOfTurn(format!(
                    "coordinator does not accept {other:?}"
                )))
            }
        };

        if loggable {
            self.log.append(&self.keys, &msg)?;
        }
        Ok(out)
    }

    /// challenge-response authentication for one identity key
    fn authenticate(
        &mut self,
        conn: ConnId,
        identity_key: String,
        challenge: Option<String>,
        response: Option<String>,
    ) -> Result<Vec<Outbound>> {
        // an already authorized key short-circuits to success
        if self.authorized.values().any(|key| *key == identity_key) {
            self.authorized.insert(conn, identity_key.clone());
            return Ok(vec![Outbound::Send(
                conn,
                Message::Authenticate {
                    identity_key,
                    challenge: None,
                    response: None,
                    success: true,
                },
            )]);
        }

        match self.challenges.get(&identity_key) {
            // second round: verify the response signature
            Some(stored) => {
                if challenge.as_deref() != Some(stored.as_str()) {
                    return Err(Error::AuthenticationFailed(format!(
                        "challenge mismatch for {identity_key}"
                    )));
                }
                let response = response.ok_or_else(|| {
                    Error::AuthenticationFailed(format!("missing response from {identity_key}"))
                })?;
                verify_hex(&identity_key, stored.as_bytes(), &response)
                    .map_err(|_| Error::AuthenticationFailed(format!(
                        "forged challenge response from {identity_key}"
                    )))?;

                info!(identity = %identity_key, "identity passed the challenge");
                self.challenges.remove(&identity_key);
                self.authorized.insert(conn, identity_key.clone());
                Ok(vec![Outbound::Send(
                    conn,
                    Message::Authenticate {
                        identity_key,
                        challenge: None,
                        response: None,
                        success: true,
                    },
                )])
            }
            // first round: issue a fresh challenge
            None => {
                if challenge.is_some() || response.is_some() {
                    return Err(Error::AuthenticationFailed(format!(
                        "unsolicited challenge fields from {identity_key}"
                    )));
                }
                let fresh = random_challenge(self.config.challenge_len);
                info!(identity = %identity_key, "sending authentication challenge");
                self.challenges.insert(identity_key.clone(), fresh.clone());
                Ok(vec![Outbound::Send(
                    conn,
                    Message::Authenticate {
                        identity_key,
                        challenge: Some(fresh),
                        response: None,
                        success: false,
                    },
                )])
            }
        }
    }

    fn register(
        &mut self,
        conn: ConnId,
        nickname: String,
        session_key: String,
        identity_key: String,
        signature: String,
    ) -> Result<Vec<Outbound>> {
        if self.authorized.get(&conn) != Some(&identity_key) {
            return Err(Error::AuthenticationFailed(format!(
                "unauthorized registration by {identity_key}"
            )));
        }
        verify_hex(
            &session_key,
            &register_digest(&nickname, &session_key, &identity_key),
            &signature,
        )?;

        // recoverable conflicts: reply success=false, keep the
        // connection open for a retry with different values
        let rejection = |why: &str| {
            warn!(nickname = %nickname, "registration denied: {why}");
            Ok(vec![Outbound::Send(
                conn,
                Message::Register {
                    nickname: nickname.clone(),
                    session_key: session_key.clone(),
                    identity_key: identity_key.clone(),
                    signature: signature.clone(),
                    success: false,
                    sequence: None,
                },
            )])
        };

        if self.users().iter().any(|u| u.nickname == nickname) {
            return rejection("nickname already taken");
        }
        if self.users().iter().any(|u| u.public_key == session_key) {
            return rejection("session key already taken");
        }

        let is_dealer = self.config.dealer_keys.contains(&identity_key);
        let sequence = if is_dealer {
            if self.dealer.is_some() {
                return rejection("a dealer is already registered");
            }
            0
        } else {
            if self.players.len() as u32 >= self.config.party_size {
                return rejection("party is full");
            }
            self.next_player_sequence()
        };

        let user = UserData { sequence, nickname: nickname.clone(), public_key: session_key.clone() };
        if is_dealer {
            info!(nickname = %nickname, "dealer registered");
            self.dealer = Some((conn, user));
        } else {
            info!(nickname = %nickname, sequence, "player registered");
            self.players.insert(conn, user);
        }

        let mut out = vec![
            Outbound::Send(
                conn,
                Message::Register {
                    nickname,
                    session_key,
                    identity_key,
                    signature,
                    success: true,
                    sequence: Some(sequence),
                },
            ),
            Outbound::Send(
                conn,
                Message::GameInfo {
                    sequence,
                    card_size: self.config.card_size,
                    deck_size: self.config.deck_size,
                },
            ),
        ];
        out.extend(self.party_changed());
        Ok(out)
    }

    /// lowest unused positive sequence, so a slot freed by a pre-game
    /// disconnect is refilled and sequences stay 1..=N
    fn next_player_sequence(&self) -> u32 {
        let mut seq = 1;
        while self.players.values().any(|u| u.sequence == seq) {
            seq += 1;
        }
        seq
    }

    /// broadcast party status; when the party completes, freeze
    /// registration, distribute the signed roster and trigger the
    /// dealer's deck generation
    fn party_changed(&mut self) -> Vec<Outbound> {
        let current = self.players.len() as u32;
        let dealer_present = self.dealer.is_some();
        info!(current, maximum = self.config.party_size, dealer_present, "party status changed");

        let update = Message::PartyUpdate {
            current,
            maximum: self.config.party_size,
            dealer: dealer_present,
        };
        let mut out: Vec<Outbound> = self
            .registered_conns()
            .into_iter()
            .map(|c| Outbound::Send(c, update.clone()))
            .collect();

        if current == self.config.party_size && dealer_present {
            info!("party complete, starting game");
            self.playing = true;

            let roster = self.users();
            let announce = Message::GetUsers {
                identity_key: self.keys.public_hex(),
                signature: self.keys.sign_hex(&roster_digest(&roster)),
                response: roster,
            };
            for conn in self.registered_conns() {
                out.push(Outbound::Send(conn, announce.clone()));
            }

            let (dealer_conn, _) = self.dealer.as_ref().expect("dealer present");
            out.push(Outbound::Send(*dealer_conn, Message::GenerateDeck));
        }
        out
    }

    fn query_users(&self, conn: ConnId, identity_key: &str, signature: &str) -> Result<Vec<Outbound>> {
        self.check_query(conn, identity_key, signature, "GETUSERS")?;
        let roster = self.users();
        Ok(vec![Outbound::Send(
            conn,
            Message::GetUsers {
                identity_key: self.keys.public_hex(),
                signature: self.keys.sign_hex(&roster_digest(&roster)),
                response: roster,
            },
        )])
    }

    fn query_log(&self, conn: ConnId, identity_key: &str, signature: &str) -> Result<Vec<Outbound>> {
        self.check_query(conn, identity_key, signature, "GETLOG")?;
        let entries = self.log.entries().to_vec();
        Ok(vec![Outbound::Send(
            conn,
            Message::GetLog {
                identity_key: self.keys.public_hex(),
                signature: self.keys.sign_hex(&entries_digest(&entries)),
                response: entries,
            },
        )])
    }

    fn check_query(&self, conn: ConnId, identity_key: &str, signature: &str, kind: &str) -> Result<()> {
        if self.authorized.get(&conn).map(String::as_str) != Some(identity_key) {
            return Err(Error::AuthenticationFailed(format!(
                "unauthorized {kind} query by {identity_key}"
            )));
        }
        verify_hex(identity_key, &query_digest(kind), signature)
    }

    /// route the deck pipeline without inspecting deck contents
    fn relay_deck(&self, conn: ConnId, msg: Message, sequence: u32, done: bool) -> Result<Vec<Outbound>> {
        if !self.playing {
            return Err(Error::OutOfTurn("deck pipeline before game start".into()));
        }
        if !self.is_registered(conn) {
            return Err(Error::OutOfTurn("pipeline message from unregistered connection".into()));
        }

        if done {
            // committed: every player stores the final ciphertext
            // deck, then everyone is asked to reveal its key
            let mut out: Vec<Outbound> = self
                .players
                .keys()
                .map(|&c| Outbound::Send(c, msg.clone()))
                .collect();
            for (c, user) in self.participants() {
                out.push(Outbound::Send(c, Message::DeckKeyRequest { sequence: user.sequence }));
            }
            return Ok(out);
        }

        // next hop by sequence, wrapping back to the dealer
        let target = if sequence <= self.config.party_size {
            self.players
                .iter()
                .find(|(_, u)| u.sequence == sequence)
                .map(|(&c, _)| c)
        } else {
            self.dealer.as_ref().map(|(c, _)| *c)
        };
        let target = target.ok_or_else(|| {
            Error::OutOfTurn(format!("no participant for pipeline sequence {sequence}"))
        })?;
        Ok(vec![Outbound::Send(target, msg)])
    }

    /// revealed keys are broadcast verbatim to every other participant
    fn relay_reveal(&self, conn: ConnId, msg: Message) -> Result<Vec<Outbound>> {
        if !self.playing {
            return Err(Error::OutOfTurn("key reveal before game start".into()));
        }
        Ok(self
            .participants()
            .into_iter()
            .filter(|(c, _)| *c != conn)
            .map(|(c, _)| Outbound::Send(c, msg.clone()))
            .collect())
    }

    /// a participant announced completion or a local abort; relay to
    /// everyone else and end the session. only a registered
    /// participant of the running game may end it
    fn game_over(&mut self, conn: ConnId, status: GameStatus, detail: Option<String>) -> Result<Vec<Outbound>> {
        if !self.playing {
            return Err(Error::OutOfTurn("session end before game start".into()));
        }
        if !self.is_registered(conn) {
            return Err(Error::OutOfTurn("session end from unregistered connection".into()));
        }
        info!(?status, ?detail, "session ended by participant");
        self.playing = false;
        let msg = Message::GameOver { status, detail };
        let mut out: Vec<Outbound> = self
            .participants()
            .into_iter()
            .filter(|(c, _)| *c != conn)
            .map(|(c, _)| Outbound::Send(c, msg.clone()))
            .collect();
        out.push(Outbound::Shutdown);
        Ok(out)
    }

    /// pre-game, a disconnect frees the slot; mid-game it is fatal to
    /// the whole session
    pub fn disconnect(&mut self, conn: ConnId) -> Vec<Outbound> {
        if let Some(identity) = self.authorized.remove(&conn) {
            self.challenges.remove(&identity);
        }

        let was_dealer = matches!(self.dealer, Some((c, _)) if c == conn);
        let was_player = self.players.contains_key(&conn);
        if !was_dealer && !was_player {
            return Vec::new();
        }

        if self.playing {
            warn!(conn, "participant left mid-game, aborting session");
            let msg = Message::GameOver { status: GameStatus::PeerLeft, detail: None };
            let mut out: Vec<Outbound> = self
                .participants()
                .into_iter()
                .filter(|(c, _)| *c != conn)
                .map(|(c, _)| Outbound::Send(c, msg.clone()))
                .collect();
            out.push(Outbound::Shutdown);
            return out;
        }

        info!(conn, "participant left before game start");
        if was_dealer {
            self.dealer = None;
        } else {
            self.players.remove(&conn);
        }
        self.party_changed()
    }

    /// roster ordered by sequence: dealer first, then players
    pub fn users(&self) -> Vec<UserData> {
        let mut users: Vec<UserData> = self
            .dealer
            .iter()
            .map(|(_, u)| u.clone())
            .chain(self.players.values().cloned())
            .collect();
        users.sort_by_key(|u| u.sequence);
        users
    }

    fn participants(&self) -> Vec<(ConnId, UserData)> {
        self.dealer
            .iter()
            .map(|(c, u)| (*c, u.clone()))
            .chain(self.players.iter().map(|(&c, u)| (c, u.clone())))
            .collect()
    }

    fn registered_conns(&self) -> Vec<ConnId> {
        self.participants().into_iter().map(|(c, _)| c).collect()
    }

    fn is_registered(&self, conn: ConnId) -> bool {
        self.players.contains_key(&conn)
            || matches!(self.dealer, Some((c, _)) if c == conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CHALLENGE_LEN;
    use crate::crypto::IdentityCard;

    fn config(dealer: &IdentityCard) -> GameConfig {
        GameConfig {
            port: 0,
            party_size: 2,
            card_size: 2,
            deck_size: 5,
            challenge_len: DEFAULT_CHALLENGE_LEN,
            dealer_keys: [dealer.public_key()].into_iter().collect(),
        }
    }

    /// run the two-round challenge for `identity` on `conn`
    fn authorize(coord: &mut Coordinator, conn: ConnId, identity: &IdentityCard) {
        let out = coord
            .handle(conn, Message::Authenticate {
                identity_key: identity.public_key(),
                challenge: None,
                response: None,
                success: false,
            })
            .unwrap();
        let Outbound::Send(_, Message::Authenticate { challenge: Some(challenge), .. }) = &out[0]
        else {
            panic!("expected a challenge");
        };

        let out = coord
            .handle(conn, Message::Authenticate {
                identity_key: identity.public_key(),
                challenge: Some(challenge.clone()),
                response: Some(identity.sign(challenge.as_bytes())),
                success: false,
            })
            .unwrap();
        assert!(matches!(
            out[0],
            Outbound::Send(c, Message::Authenticate { success: true, .. }) if c == conn
        ));
    }

    fn register(coord: &mut Coordinator, conn: ConnId, identity: &IdentityCard, nickname: &str) -> Vec<Outbound> {
        let keys = SessionKeys::generate();
        let signature = keys.sign_hex(&register_digest(
            nickname,
            &keys.public_hex(),
            &identity.public_key(),
        ));
        coord
            .handle(conn, Message::Register {
                nickname: nickname.into(),
                session_key: keys.public_hex(),
                identity_key: identity.public_key(),
                signature,
                success: false,
                sequence: None,
            })
            .unwrap()
    }

    #[test]
    fn test_forged_challenge_response_rejected() {
        let dealer = IdentityCard::generate();
        let mut coord = Coordinator::new(config(&dealer), SessionKeys::generate());
        let imposter = IdentityCard::generate();

        let out = coord
            .handle(1, Message::Authenticate {
                identity_key: dealer.public_key(),
                challenge: None,
                response: None,
                success: false,
            })
            .unwrap();
        let Outbound::Send(_, Message::Authenticate { challenge: Some(challenge), .. }) = &out[0]
        else {
            panic!("expected a challenge");
        };

        // response signed by the wrong key
        let err = coord.handle(1, Message::Authenticate {
            identity_key: dealer.public_key(),
            challenge: Some(challenge.clone()),
            response: Some(imposter.sign(challenge.as_bytes())),
            success: false,
        });
        assert!(matches!(err, Err(Error::AuthenticationFailed(_))));
    }

    #[test]
    fn test_unregistered_identity_cannot_register() {
        let dealer = IdentityCard::generate();
        let mut coord = Coordinator::new(config(&dealer), SessionKeys::generate());
        let player = IdentityCard::generate();
        // no authentication first
        let keys = SessionKeys::generate();
        let err = coord.handle(1, Message::Register {
            nickname: "eve".into(),
            session_key: keys.public_hex(),
            identity_key: player.public_key(),
            signature: keys.sign_hex(&register_digest("eve", &keys.public_hex(), &player.public_key())),
            success: false,
            sequence: None,
        });
        assert!(matches!(err, Err(Error::AuthenticationFailed(_))));
    }

    #[test]
    fn test_second_dealer_rejected() {
        let dealer = IdentityCard::generate();
        let mut cfg = config(&dealer);
        let second = IdentityCard::generate();
        cfg.dealer_keys.insert(second.public_key());
        let mut coord = Coordinator::new(cfg, SessionKeys::generate());

        authorize(&mut coord, 1, &dealer);
        let out = register(&mut coord, 1, &dealer, "caller");
        assert!(matches!(
            out[0],
            Outbound::Send(1, Message::Register { success: true, sequence: Some(0), .. })
        ));

        authorize(&mut coord, 2, &second);
        let out = register(&mut coord, 2, &second, "usurper");
        assert!(matches!(
            out[0],
            Outbound::Send(2, Message::Register { success: false, sequence: None, .. })
        ));
    }

    #[test]
    fn test_duplicate_nickname_rejected_but_retryable() {
        let dealer = IdentityCard::generate();
        let mut coord = Coordinator::new(config(&dealer), SessionKeys::generate());
        let a = IdentityCard::generate();
        let b = IdentityCard::generate();

        authorize(&mut coord, 1, &a);
        authorize(&mut coord, 2, &b);
        register(&mut coord, 1, &a, "ana");
        let out = register(&mut coord, 2, &b, "ana");
        assert!(matches!(
            out[0],
            Outbound::Send(2, Message::Register { success: false, .. })
        ));
        // retry with a fresh nickname succeeds
        let out = register(&mut coord, 2, &b, "bea");
        assert!(matches!(
            out[0],
            Outbound::Send(2, Message::Register { success: true, sequence: Some(_), .. })
        ));
    }

    #[test]
    fn test_freed_sequence_is_refilled() {
        let dealer = IdentityCard::generate();
        let mut cfg = config(&dealer);
        cfg.party_size = 3;
        let mut coord = Coordinator::new(cfg, SessionKeys::generate());

        let a = IdentityCard::generate();
        let b = IdentityCard::generate();
        let c = IdentityCard::generate();
        authorize(&mut coord, 1, &a);
        authorize(&mut coord, 2, &b);
        register(&mut coord, 1, &a, "ana");
        register(&mut coord, 2, &b, "bea");

        coord.disconnect(1);
        authorize(&mut coord, 3, &c);
        let out = register(&mut coord, 3, &c, "carla");
        assert!(matches!(
            out[0],
            Outbound::Send(3, Message::Register { success: true, sequence: Some(1), .. })
        ));
    }

    #[test]
    fn test_game_starts_when_party_complete() {
        let dealer = IdentityCard::generate();
        let mut coord = Coordinator::new(config(&dealer), SessionKeys::generate());
        let a = IdentityCard::generate();
        let b = IdentityCard::generate();

        authorize(&mut coord, 1, &dealer);
        register(&mut coord, 1, &dealer, "caller");
        authorize(&mut coord, 2, &a);
        register(&mut coord, 2, &a, "ana");
        authorize(&mut coord, 3, &b);
        let out = register(&mut coord, 3, &b, "bea");

        assert!(coord.is_playing());
        // dealer is instructed to generate the deck
        assert!(out.iter().any(|o| matches!(o, Outbound::Send(1, Message::GenerateDeck))));
        // everyone gets the signed roster
        let rosters = out
            .iter()
            .filter(|o| matches!(o, Outbound::Send(_, Message::GetUsers { .. })))
            .count();
        assert_eq!(rosters, 3);
        // and new connections are refused
        assert!(coord.accept(9).is_err());
    }

    #[test]
    fn test_midgame_disconnect_aborts_session() {
        let dealer = IdentityCard::generate();
        let mut coord = Coordinator::new(config(&dealer), SessionKeys::generate());
        let a = IdentityCard::generate();
        let b = IdentityCard::generate();
        authorize(&mut coord, 1, &dealer);
        register(&mut coord, 1, &dealer, "caller");
        authorize(&mut coord, 2, &a);
        register(&mut coord, 2, &a, "ana");
        authorize(&mut coord, 3, &b);
        register(&mut coord, 3, &b, "bea");
        assert!(coord.is_playing());

        let out = coord.disconnect(2);
        assert!(out.iter().any(|o| matches!(
            o,
            Outbound::Send(_, Message::GameOver { status: GameStatus::PeerLeft, .. })
        )));
        assert!(out.contains(&Outbound::Shutdown));
    }

    #[test]
    fn test_gameover_requires_registered_midgame_sender() {
        let dealer = IdentityCard::generate();
        let mut coord = Coordinator::new(config(&dealer), SessionKeys::generate());
        let over = Message::GameOver { status: GameStatus::Aborted, detail: None };

        // nobody may end a session that has not started
        let err = coord.handle(9, over.clone());
        assert!(matches!(err, Err(Error::OutOfTurn(_))));

        let a = IdentityCard::generate();
        let b = IdentityCard::generate();
        authorize(&mut coord, 1, &dealer);
        register(&mut coord, 1, &dealer, "caller");
        authorize(&mut coord, 2, &a);
        register(&mut coord, 2, &a, "ana");
        authorize(&mut coord, 3, &b);
        register(&mut coord, 3, &b, "bea");
        assert!(coord.is_playing());

        // a connection that never registered cannot end it either
        let err = coord.handle(9, over.clone());
        assert!(matches!(err, Err(Error::OutOfTurn(_))));
        assert!(coord.is_playing());

        // a registered participant can
        let out = coord.handle(2, over).unwrap();
        assert!(out.contains(&Outbound::Shutdown));
    }

    #[test]
    fn test_audit_log_covers_session_and_verifies() {
        let dealer = IdentityCard::generate();
        let mut coord = Coordinator::new(config(&dealer), SessionKeys::generate());
        authorize(&mut coord, 1, &dealer);
        register(&mut coord, 1, &dealer, "caller");

        // genesis + 2 auth rounds + register
        assert_eq!(coord.audit_log().len(), 4);
        coord.audit_log().verify_chain(&coord.public_key()).unwrap();
    }
}
