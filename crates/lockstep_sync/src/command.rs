//! Command envelopes exchanged between peers.
//!
//! A [`Command`] is `{kind, origin_frame, player, payload}`. On the wire the
//! kind travels as its type tag, followed by the origin frame, the player and
//! the payload as a length-prefixed byte array. Payload fields are encoded
//! with the positional packet format by the matching [`Payload`] type.

use std::cmp::Ordering;

use lockstep_component::Entity;
use lockstep_packet::{Packet, PacketError, TypeTag, WireSink};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Discriminant of a [`Command`].
///
/// The declaration order is the canonical order of commands that share a
/// frame and a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    Synchronize,
    GameStateRequest,
    GameStateResponse,
    AddGameObject,
    RemoveGameObject,
    PlayerInput,
}

impl CommandKind {
    pub const ALL: [CommandKind; 6] = [
        CommandKind::Synchronize,
        CommandKind::GameStateRequest,
        CommandKind::GameStateResponse,
        CommandKind::AddGameObject,
        CommandKind::RemoveGameObject,
        CommandKind::PlayerInput,
    ];

    pub fn type_tag(self) -> &'static str {
        match self {
            Self::Synchronize => Synchronize::TYPE_TAG,
            Self::GameStateRequest => GameStateRequest::TYPE_TAG,
            Self::GameStateResponse => GameStateResponse::TYPE_TAG,
            Self::AddGameObject => AddGameObject::TYPE_TAG,
            Self::RemoveGameObject => RemoveGameObject::TYPE_TAG,
            Self::PlayerInput => PlayerInput::TYPE_TAG,
        }
    }

    pub fn from_type_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_tag() == tag)
    }

    /// Whether commands of this kind change simulation state at their origin
    /// frame, and so take part in rollback.
    pub fn is_frame_bound(self) -> bool {
        matches!(
            self,
            Self::AddGameObject | Self::RemoveGameObject | Self::PlayerInput
        )
    }
}

/// Typed contents of one [`CommandKind`].
pub trait Payload: TypeTag + Serialize + DeserializeOwned {
    const KIND: CommandKind;
}

/// Carries the sender's clock and its hash for that frame. Adjusts pacing
/// only; never changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synchronize {
    pub clock: u64,
    pub hash: u32,
}

/// Asks a peer for a full [`GameStateResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStateRequest;

/// A full simulation snapshot taken at the start of `frame`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStateResponse {
    pub frame: u64,
    pub snapshot: Vec<u8>,
}

/// Spawns an entity from a blob written by `World::write_entity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddGameObject {
    pub blob: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveGameObject {
    pub entity: Entity,
}

/// One discrete input change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInput {
    pub action: u16,
    pub pressed: bool,
}

macro_rules! payload {
    ($ty:ident, $tag:literal) => {
        impl TypeTag for $ty {
            const TYPE_TAG: &'static str = $tag;
        }

        impl Payload for $ty {
            const KIND: CommandKind = CommandKind::$ty;
        }
    };
}

payload!(Synchronize, "lockstep.sync.Synchronize");
payload!(GameStateRequest, "lockstep.sync.GameStateRequest");
payload!(GameStateResponse, "lockstep.sync.GameStateResponse");
payload!(AddGameObject, "lockstep.sync.AddGameObject");
payload!(RemoveGameObject, "lockstep.sync.RemoveGameObject");
payload!(PlayerInput, "lockstep.sync.PlayerInput");

/// A command envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    /// Frame the command logically belongs to.
    pub origin_frame: u64,
    pub player: u32,
    pub payload: Packet,
}

impl Command {
    /// Wrap `payload` for `origin_frame`.
    pub fn new<P: Payload>(origin_frame: u64, player: u32, payload: &P) -> Result<Self, PacketError> {
        let mut packet = Packet::new();
        packet.write(payload)?;
        Ok(Self {
            kind: P::KIND,
            origin_frame,
            player,
            payload: packet,
        })
    }

    /// Decode the payload as `P`.
    ///
    /// # Errors
    ///
    /// [`PacketError::TypeTagMismatch`] if this command is of another kind,
    /// or any error decoding the payload bytes.
    pub fn decode<P: Payload>(&self) -> Result<P, PacketError> {
        if self.kind != P::KIND {
            return Err(PacketError::TypeTagMismatch {
                expected: P::TYPE_TAG.to_string(),
                found: self.kind.type_tag().to_string(),
            });
        }
        let mut payload = self.payload.clone();
        payload.rewind();
        payload.read()
    }

    pub fn write(&self, sink: &mut dyn WireSink) -> Result<(), PacketError> {
        sink.write_string(Some(self.kind.type_tag()))?;
        sink.write_u64(self.origin_frame);
        sink.write_u32(self.player);
        sink.write_bytes(Some(self.payload.as_bytes()))
    }

    /// Read one command written by [`Command::write`].
    ///
    /// # Errors
    ///
    /// [`PacketError::UnknownTypeTag`] for a tag that names no command kind,
    /// [`PacketError::UnexpectedNull`] for a null tag or payload.
    pub fn read(packet: &mut Packet) -> Result<Self, PacketError> {
        let tag = packet.read_type_tag()?.ok_or(PacketError::UnexpectedNull)?;
        let kind = CommandKind::from_type_tag(&tag).ok_or(PacketError::UnknownTypeTag(tag))?;
        let origin_frame = packet.read_u64()?;
        let player = packet.read_u32()?;
        let payload = packet.read_bytes()?.ok_or(PacketError::UnexpectedNull)?;
        Ok(Self {
            kind,
            origin_frame,
            player,
            payload: Packet::from_bytes(payload),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PacketError> {
        let mut packet = Packet::new();
        self.write(&mut packet)?;
        Ok(packet.into_bytes())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, PacketError> {
        Self::read(&mut Packet::from_bytes(bytes))
    }

    /// Order in which commands of one frame are applied: by player, then
    /// kind, then payload bytes. Independent of arrival order.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        (self.origin_frame, self.player, self.kind)
            .cmp(&(other.origin_frame, other.player, other.kind))
            .then_with(|| self.payload.as_bytes().cmp(other.payload.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_layout_starts_with_tag() {
        let command = Command::new(7, 2, &PlayerInput { action: 3, pressed: true }).unwrap();
        let mut packet = Packet::from_bytes(command.to_bytes().unwrap());
        assert_eq!(
            packet.read_string().unwrap().as_deref(),
            Some("lockstep.sync.PlayerInput")
        );
        assert_eq!(packet.read_u64().unwrap(), 7);
        assert_eq!(packet.read_u32().unwrap(), 2);
        assert_eq!(packet.read_bytes().unwrap(), Some(vec![3, 0, 1]));
        assert_eq!(packet.remaining(), 0);
    }

    #[test]
    fn test_read_back_and_decode() {
        let sent = Command::new(
            11,
            0,
            &GameStateResponse {
                frame: 11,
                snapshot: vec![1, 2, 3],
            },
        )
        .unwrap();
        let received = Command::from_bytes(sent.to_bytes().unwrap()).unwrap();
        assert_eq!(received, sent);
        let response: GameStateResponse = received.decode().unwrap();
        assert_eq!(response.snapshot, vec![1, 2, 3]);
    }

    #[test]
    fn test_decode_as_wrong_kind_fails() {
        let command = Command::new(0, 0, &GameStateRequest).unwrap();
        assert!(command.payload.is_empty());
        assert!(matches!(
            command.decode::<PlayerInput>(),
            Err(PacketError::TypeTagMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let mut packet = Packet::new();
        packet.write_string(Some("lockstep.sync.Teleport")).unwrap();
        packet.write_u64(0);
        assert!(matches!(
            Command::read(&mut packet),
            Err(PacketError::UnknownTypeTag(tag)) if tag == "lockstep.sync.Teleport"
        ));
    }

    #[test]
    fn test_every_kind_has_a_distinct_tag() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_type_tag(kind.type_tag()), Some(kind));
        }
    }

    #[test]
    fn test_canonical_order_ignores_arrival() {
        let a = Command::new(5, 1, &PlayerInput { action: 1, pressed: true }).unwrap();
        let b = Command::new(5, 0, &PlayerInput { action: 9, pressed: false }).unwrap();
        let c = Command::new(5, 0, &PlayerInput { action: 2, pressed: true }).unwrap();
        let mut one = vec![a.clone(), b.clone(), c.clone()];
        let mut two = vec![c, a, b];
        one.sort_by(Command::canonical_cmp);
        two.sort_by(Command::canonical_cmp);
        assert_eq!(one, two);
        assert_eq!(one[0].player, 0);
        assert_eq!(one[2].player, 1);
    }
}
