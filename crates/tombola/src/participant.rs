//! participant - shared dealer/player protocol state machine
//!
//! both roles run the same progression: authenticate, register,
//! receive game parameters, take part in the deck pipeline, reveal
//! the symmetric key, decrypt and validate the committed deck, derive
//! cards and resolve the winner. the dealer additionally seeds the
//! initial deck; players each apply one shuffle+encrypt layer.
//!
//! transport-free like the coordinator: `handle` consumes one inbound
//! message and returns the messages to send back to the coordinator.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::audit::{entries_digest, verify_entries};
use crate::crypto::{verify_hex, DeckKey, IdentityCard, SessionKeys};
use crate::error::{Error, Result};
use crate::game::{
    apply_layer, build_deck, deck_digest, decode_values, derive_card, initial_slots,
    key_reveal_digest, peel_layer, query_digest, register_digest, resolve_winners, roster_digest,
    slots_from_hex, slots_to_hex, validate_deck, Slots,
};
use crate::protocol::{GameStatus, LogEntry, Message, UserData};

/// session role
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// seeds the initial deck, sequence 0
    Dealer,
    /// applies one layer, sequence 1..=N
    Player,
}

/// protocol phase progression
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Connected,
    Authenticated,
    Registered,
    /// the deck is travelling through the layer pipeline
    Pipeline,
    /// holding the committed ciphertext deck, awaiting key requests
    Committed,
    /// collecting revealed deck keys
    Revealing,
    Resolved,
    Aborted,
}

/// the locally computed end state, identical on every honest
/// participant because it derives only from revealed public data
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// fully decrypted deck, in draw order
    pub deck: Vec<u32>,
    /// card per player sequence
    pub cards: BTreeMap<u32, Vec<u32>>,
    /// player sequences whose card completed first
    pub winners: Vec<u32>,
}

pub struct Participant {
    role: Role,
    nickname: String,
    identity: IdentityCard,
    keys: SessionKeys,
    deck_key: DeckKey,
    phase: Phase,
    sequence: Option<u32>,
    card_size: u32,
    deck_size: u32,
    /// roster by sequence, distributed at game start
    users: BTreeMap<u32, UserData>,
    /// coordinator public key, learned from its signed roster/log
    coordinator_key: Option<String>,
    /// last fetched audit log
    log: Vec<LogEntry>,
    /// committed ciphertext deck and its layer signatures
    committed: Option<(Slots, Vec<String>)>,
    /// revealed symmetric keys by sequence
    deck_keys: BTreeMap<u32, DeckKey>,
    outcome: Option<Outcome>,
}

impl Participant {
    pub fn new(role: Role, nickname: impl Into<String>, identity: IdentityCard) -> Self {
        Self {
            role,
            nickname: nickname.into(),
            identity,
            keys: SessionKeys::generate(),
            deck_key: DeckKey::generate(),
            phase: Phase::Connected,
            sequence: None,
            card_size: 0,
            deck_size: 0,
            users: BTreeMap::new(),
            coordinator_key: None,
            log: Vec::new(),
            committed: None,
            deck_keys: BTreeMap::new(),
            outcome: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn sequence(&self) -> Option<u32> {
        self.sequence
    }

    pub fn identity_key(&self) -> String {
        self.identity.public_key()
    }

    pub fn users(&self) -> &BTreeMap<u32, UserData> {
        &self.users
    }

    pub fn audit_entries(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// signatures of the committed deck, one per applied layer
    pub fn committed_signatures(&self) -> Option<&[String]> {
        self.committed.as_ref().map(|(_, sigs)| sigs.as_slice())
    }

    /// first message of the challenge-response exchange
    pub fn auth_request(&self) -> Message {
        Message::Authenticate {
            identity_key: self.identity.public_key(),
            challenge: None,
            response: None,
            success: false,
        }
    }

    /// registration with a fresh nickname binding signed by the
    /// session key
    pub fn register_request(&self) -> Message {
        let session_key = self.keys.public_hex();
        let identity_key = self.identity.public_key();
        let signature = self
            .keys
            .sign_hex(&register_digest(&self.nickname, &session_key, &identity_key));
        Message::Register {
            nickname: self.nickname.clone(),
            session_key,
            identity_key,
            signature,
            success: false,
            sequence: None,
        }
    }

    /// signed roster query
    pub fn users_request(&self) -> Message {
        Message::GetUsers {
            identity_key: self.identity.public_key(),
            signature: self.identity.sign(&query_digest("GETUSERS")),
            response: Vec::new(),
        }
    }

    /// signed audit log query
    pub fn log_request(&self) -> Message {
        Message::GetLog {
            identity_key: self.identity.public_key(),
            signature: self.identity.sign(&query_digest("GETLOG")),
            response: Vec::new(),
        }
    }

    /// dispatch one inbound message, returning replies to send
    pub fn handle(&mut self, msg: Message) -> Result<Vec<Message>> {
        match msg {
            Message::Authenticate { challenge, success, .. } => {
                self.on_authenticate(challenge, success)
            }
            Message::Register { success, sequence, .. } => self.on_register(success, sequence),
            Message::GameInfo { sequence, card_size, deck_size } => {
                self.sequence = Some(sequence);
                self.card_size = card_size;
                self.deck_size = deck_size;
                info!(sequence, card_size, deck_size, "received game parameters");
                Ok(Vec::new())
            }
            Message::GetUsers { identity_key, signature, response } => {
                self.on_roster(identity_key, signature, response)
            }
            Message::GetLog { identity_key, signature, response } => {
                self.on_log(identity_key, signature, response)
            }
            Message::PartyUpdate { current, maximum, dealer } => {
                info!(current, maximum, dealer, "party status");
                Ok(Vec::new())
            }
            Message::GenerateDeck => self.on_generate_deck(),
            Message::GenerateCard { sequence, deck, signatures, done } => {
                self.on_generate_card(sequence, deck, signatures, done)
            }
            Message::DeckKeyRequest { sequence } => self.on_key_request(sequence),
            Message::DeckKeyResponse { sequence, key, signature } => {
                self.on_key_response(sequence, key, signature)
            }
            Message::GameOver { status, detail } => self.on_game_over(status, detail),
        }
    }

    fn on_authenticate(&mut self, challenge: Option<String>, success: bool) -> Result<Vec<Message>> {
        if self.phase != Phase::Connected {
            return Ok(Vec::new());
        }
        if success {
            info!("authenticated to the coordinator");
            self.phase = Phase::Authenticated;
            return Ok(Vec::new());
        }
        let challenge = challenge
            .ok_or_else(|| Error::OutOfTurn("authenticate reply without challenge".into()))?;
        info!(%challenge, "responding to challenge");
        Ok(vec![Message::Authenticate {
            identity_key: self.identity.public_key(),
            response: Some(self.identity.sign(challenge.as_bytes())),
            challenge: Some(challenge),
            success: false,
        }])
    }

    fn on_register(&mut self, success: bool, sequence: Option<u32>) -> Result<Vec<Message>> {
        if self.phase != Phase::Authenticated {
            return Ok(Vec::new());
        }
        if !success {
            // recoverable: the caller may retry with another nickname
            warn!(nickname = %self.nickname, "registration denied");
            return Ok(Vec::new());
        }
        self.sequence = sequence;
        self.phase = Phase::Registered;
        info!(nickname = %self.nickname, ?sequence, "registered");
        Ok(Vec::new())
    }

    fn on_roster(
        &mut self,
        identity_key: String,
        signature: String,
        response: Vec<UserData>,
    ) -> Result<Vec<Message>> {
        verify_hex(&identity_key, &roster_digest(&response), &signature)?;
        if let Some(known) = &self.coordinator_key {
            if *known != identity_key {
                return Err(Error::BadSignature("coordinator key changed".into()));
            }
        }
        self.coordinator_key = Some(identity_key);
        self.users = response.into_iter().map(|u| (u.sequence, u)).collect();
        info!(count = self.users.len(), "received roster");
        Ok(Vec::new())
    }

    fn on_log(
        &mut self,
        identity_key: String,
        signature: String,
        response: Vec<LogEntry>,
    ) -> Result<Vec<Message>> {
        verify_hex(&identity_key, &entries_digest(&response), &signature)?;
        verify_entries(&response, &identity_key)?;
        info!(entries = response.len(), "audit log verified");
        self.log = response;
        Ok(Vec::new())
    }

    /// dealer only: build the deck in uniformly random order, apply
    /// the base encryption layer and start the pipeline
    fn on_generate_deck(&mut self) -> Result<Vec<Message>> {
        if self.role != Role::Dealer || self.phase != Phase::Registered {
            return Err(Error::OutOfTurn("unexpected deck generation request".into()));
        }

        let deck = build_deck(self.deck_size);
        info!(deck_size = self.deck_size, "generating and committing deck");

        // the dealer's hiding permutation is the random initial
        // order; its layer encrypts without a deterministic shuffle
        let slots = apply_layer(&initial_slots(&deck), &self.deck_key, false);
        let signature = self.keys.sign_hex(&deck_digest(&slots));

        self.phase = Phase::Pipeline;
        Ok(vec![Message::GenerateCard {
            sequence: 1,
            deck: slots_to_hex(&slots),
            signatures: vec![signature],
            done: false,
        }])
    }

    fn on_generate_card(
        &mut self,
        sequence: u32,
        deck: Vec<String>,
        signatures: Vec<String>,
        done: bool,
    ) -> Result<Vec<Message>> {
        if done {
            // committed deck broadcast: store and await key requests
            if self.role != Role::Player || !matches!(self.phase, Phase::Registered | Phase::Pipeline) {
                return Err(Error::OutOfTurn("unexpected committed deck".into()));
            }
            let slots = slots_from_hex(&deck)?;
            info!(layers = signatures.len(), "storing committed deck");
            self.committed = Some((slots, signatures));
            self.phase = Phase::Committed;
            return Ok(Vec::new());
        }

        let my_sequence = self
            .sequence
            .ok_or_else(|| Error::OutOfTurn("pipeline message before registration".into()))?;

        match self.role {
            // a player's turn: verify the previous hop, layer, forward
            Role::Player => {
                if self.phase != Phase::Registered || sequence != my_sequence {
                    return Err(Error::OutOfTurn(format!(
                        "pipeline sequence {sequence} does not match own {my_sequence}"
                    )));
                }
                let slots = slots_from_hex(&deck)?;
                if let Err(e) = self.verify_last_layer(&slots, &signatures, sequence - 1) {
                    return Ok(self.abort(e));
                }

                info!(sequence, "applying layer and forwarding deck");
                let layered = apply_layer(&slots, &self.deck_key, true);
                let mut signatures = signatures;
                signatures.push(self.keys.sign_hex(&deck_digest(&layered)));

                self.phase = Phase::Pipeline;
                Ok(vec![Message::GenerateCard {
                    sequence: sequence + 1,
                    deck: slots_to_hex(&layered),
                    signatures,
                    done: false,
                }])
            }
            // pipeline returned to the dealer: verify the last layer,
            // store the commitment and flag it done. no new signature,
            // so exactly one accumulates per layer
            Role::Dealer => {
                let layers = self.users.len() as u32;
                if self.phase != Phase::Pipeline || sequence != layers {
                    return Err(Error::OutOfTurn(format!(
                        "pipeline returned with sequence {sequence}, expected {layers}"
                    )));
                }
                let slots = slots_from_hex(&deck)?;
                if let Err(e) = self.verify_last_layer(&slots, &signatures, layers - 1) {
                    return Ok(self.abort(e));
                }

                info!(layers = signatures.len(), "pipeline complete, committing deck");
                self.committed = Some((slots.clone(), signatures.clone()));
                self.phase = Phase::Committed;
                Ok(vec![Message::GenerateCard {
                    sequence,
                    deck: slots_to_hex(&slots),
                    signatures,
                    done: true,
                }])
            }
        }
    }

    /// verify the most recent pipeline signature against the session
    /// key of the participant with sequence `owner`
    fn verify_last_layer(&self, slots: &Slots, signatures: &[String], owner: u32) -> Result<()> {
        let signature = signatures
            .last()
            .ok_or_else(|| Error::BadSignature("pipeline message without signatures".into()))?;
        let owner = self
            .users
            .get(&owner)
            .ok_or_else(|| Error::BadSignature(format!("no registered user {owner}")))?;
        verify_hex(&owner.public_key, &deck_digest(slots), signature)
    }

    /// asked to reveal the deck key
    fn on_key_request(&mut self, sequence: u32) -> Result<Vec<Message>> {
        if self.committed.is_none() {
            return Err(Error::OutOfTurn("key requested without a committed deck".into()));
        }
        let my_sequence = self.sequence;
        if my_sequence != Some(sequence) {
            return Err(Error::OutOfTurn(format!(
                "key request for sequence {sequence} is not ours"
            )));
        }

        info!(sequence, "revealing deck key");
        self.phase = Phase::Revealing;
        let key_hex = self.deck_key.to_hex();
        let signature = self.keys.sign_hex(&key_reveal_digest(sequence, &key_hex));

        // our own key counts toward the reveal tally
        self.deck_keys.insert(sequence, self.deck_key.clone());
        let mut out = vec![Message::DeckKeyResponse { sequence, key: key_hex, signature }];
        out.extend(self.try_resolve()?);
        Ok(out)
    }

    /// another participant's revealed key arrived
    fn on_key_response(&mut self, sequence: u32, key: String, signature: String) -> Result<Vec<Message>> {
        let Some(owner) = self.users.get(&sequence) else {
            warn!(sequence, "discarding key reveal from unknown sequence");
            return Ok(Vec::new());
        };
        if let Err(e) = verify_hex(&owner.public_key, &key_reveal_digest(sequence, &key), &signature)
        {
            // a bad reveal signature is discarded, not fatal
            warn!(sequence, error = %e, "discarding key reveal with bad signature");
            return Ok(Vec::new());
        }
        let key = DeckKey::from_hex(&key)?;
        self.deck_keys.insert(sequence, key);
        self.try_resolve()
    }

    /// once every key is present, peel all layers in exact reverse
    /// order, validate the deck and resolve the outcome
    fn try_resolve(&mut self) -> Result<Vec<Message>> {
        if self.phase != Phase::Revealing || self.deck_keys.len() < self.users.len() {
            return Ok(Vec::new());
        }
        match self.decrypt_and_validate() {
            Ok(outcome) => {
                info!(winners = ?outcome.winners, "deck validated, outcome resolved");
                let announce = self.role == Role::Dealer;
                let detail = serde_json::to_string(&outcome.winners)?;
                self.outcome = Some(outcome);
                self.phase = Phase::Resolved;
                if announce {
                    Ok(vec![Message::GameOver {
                        status: GameStatus::Completed,
                        detail: Some(detail),
                    }])
                } else {
                    Ok(Vec::new())
                }
            }
            Err(e) => Ok(self.abort(e)),
        }
    }

    fn decrypt_and_validate(&self) -> Result<Outcome> {
        let (slots, signatures) = self
            .committed
            .as_ref()
            .ok_or_else(|| Error::OutOfTurn("no committed deck to decrypt".into()))?;
        let mut slots = slots.clone();
        let mut signatures = signatures.clone();

        let layers = self.users.len() as u32;
        if signatures.len() as u32 != layers {
            return Err(Error::BadSignature(format!(
                "expected {layers} layer signatures, got {}",
                signatures.len()
            )));
        }

        // peel newest layer first; the dealer's base layer comes last
        // and carries no deterministic permutation
        for owner in (0..layers).rev() {
            let signature = signatures.pop().expect("one signature per layer");
            let user = self
                .users
                .get(&owner)
                .ok_or_else(|| Error::BadSignature(format!("no registered user {owner}")))?;
            verify_hex(&user.public_key, &deck_digest(&slots), &signature)?;

            let key = self
                .deck_keys
                .get(&owner)
                .ok_or_else(|| Error::OutOfTurn(format!("missing deck key {owner}")))?;
            slots = peel_layer(&slots, key, owner != 0, owner)?;
        }

        let deck = decode_values(&slots)?;
        validate_deck(&deck, self.deck_size)?;

        // cards are recomputed from public post-reveal data, so every
        // participant derives identical cards for every player
        let mut cards = BTreeMap::new();
        for (&sequence, key) in self.deck_keys.iter().filter(|(&s, _)| s != 0) {
            cards.insert(sequence, derive_card(&deck, &key.seed(), self.card_size));
        }
        let winners = resolve_winners(&deck, &cards);

        Ok(Outcome { deck, cards, winners })
    }

    fn on_game_over(&mut self, status: GameStatus, detail: Option<String>) -> Result<Vec<Message>> {
        info!(?status, ?detail, "session ended");
        match status {
            GameStatus::Completed => {
                // cross-check the announced winners against our own
                if let (Some(outcome), Some(detail)) = (&self.outcome, &detail) {
                    let announced: Vec<u32> = serde_json::from_str(detail).unwrap_or_default();
                    if announced != outcome.winners {
                        warn!(?announced, ours = ?outcome.winners, "winner disagreement");
                    }
                }
                if self.phase != Phase::Resolved {
                    self.phase = Phase::Resolved;
                }
            }
            GameStatus::PeerLeft | GameStatus::Aborted => {
                self.phase = Phase::Aborted;
            }
        }
        Ok(Vec::new())
    }

    /// session-fatal local failure: record it and tell the peers
    fn abort(&mut self, err: Error) -> Vec<Message> {
        warn!(error = %err, "aborting session");
        self.phase = Phase::Aborted;
        vec![Message::GameOver {
            status: GameStatus::Aborted,
            detail: Some(err.to_string()),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_is_signed_back() {
        let mut p = Participant::new(Role::Player, "ana", IdentityCard::generate());
        let out = p
            .handle(Message::Authenticate {
                identity_key: p.identity_key(),
                challenge: Some("abcDEF".into()),
                response: None,
                success: false,
            })
            .unwrap();
        let Message::Authenticate { response: Some(response), identity_key, .. } = &out[0] else {
            panic!("expected a challenge response");
        };
        verify_hex(identity_key, b"abcDEF", response).unwrap();
    }

    #[test]
    fn test_registration_failure_is_retryable() {
        let mut p = Participant::new(Role::Player, "ana", IdentityCard::generate());
        p.handle(Message::Authenticate {
            identity_key: p.identity_key(),
            challenge: None,
            response: None,
            success: true,
        })
        .unwrap();
        assert_eq!(p.phase(), Phase::Authenticated);

        let echo = p.register_request();
        p.handle(echo).unwrap();
        // still authenticated, free to retry
        assert_eq!(p.phase(), Phase::Authenticated);
    }

    #[test]
    fn test_pipeline_rejects_wrong_sequence() {
        let mut p = Participant::new(Role::Player, "ana", IdentityCard::generate());
        p.phase = Phase::Registered;
        p.sequence = Some(2);
        let err = p.handle(Message::GenerateCard {
            sequence: 1,
            deck: vec![],
            signatures: vec![],
            done: false,
        });
        assert!(matches!(err, Err(Error::OutOfTurn(_))));
    }

    #[test]
    fn test_key_request_without_commitment_rejected() {
        let mut p = Participant::new(Role::Player, "ana", IdentityCard::generate());
        p.sequence = Some(1);
        let err = p.handle(Message::DeckKeyRequest { sequence: 1 });
        assert!(matches!(err, Err(Error::OutOfTurn(_))));
    }

    #[test]
    fn test_bad_reveal_signature_discarded() {
        let mut p = Participant::new(Role::Player, "ana", IdentityCard::generate());
        let other = SessionKeys::generate();
        p.users.insert(2, UserData {
            sequence: 2,
            nickname: "bea".into(),
            public_key: other.public_hex(),
        });
        let key = DeckKey::generate();
        let out = p
            .handle(Message::DeckKeyResponse {
                sequence: 2,
                key: key.to_hex(),
                signature: other.sign_hex(b"something else entirely"),
            })
            .unwrap();
        assert!(out.is_empty());
        assert!(p.deck_keys.is_empty());
    }
}
