//! Signaling-Protokoll (Browser <-> Gateway)
//!
//! Jede Nachricht ist ein JSON-Umschlag `{ "type": ..., "data": ...,
//! "sessionId"?: ... }`. Die `type`-Werte sind kebab-case, die Felder der
//! Nutzdaten camelCase (Browser-Konvention).
//!
//! ## Design
//! - Tagged Enum fuer typsichere Nachrichtentypen
//! - JSON-Serialisierung via serde (Signaling, nicht zeitkritisch)
//! - Der optionale `sessionId` dient Broadcast-Nachrichten an Clients
//!   die das Ziel selbst zuordnen muessen (z.B. `incoming-call`)

use serde::{Deserialize, Serialize};
use trunkline_core::types::{BridgeId, SessionId};

// ---------------------------------------------------------------------------
// SDP / ICE Nutzdaten
// ---------------------------------------------------------------------------

/// Session-Description eines Realtime Peers (Offer oder Answer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescription {
    /// "offer" oder "answer"
    #[serde(rename = "type")]
    pub typ: String,
    /// SDP-Text, wird unveraendert durchgereicht
    pub sdp: String,
}

impl SessionDescription {
    /// Erstellt ein Offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            typ: "offer".into(),
            sdp: sdp.into(),
        }
    }

    /// Erstellt ein Answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            typ: "answer".into(),
            sdp: sdp.into(),
        }
    }
}

/// ICE-Kandidat eines Realtime Peers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none", default)]
    pub sdp_mline_index: Option<u16>,
}

// ---------------------------------------------------------------------------
// Bruecken-Nutzdaten
// ---------------------------------------------------------------------------

/// Referenz auf eine laufende Bruecken-Verhandlung (Client -> Gateway)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRef {
    pub bridge_id: BridgeId,
}

/// Einladung zu einem Brueckenanruf (Gateway -> beide Parteien)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeCallData {
    pub bridge_id: BridgeId,
    /// Die Gegenseite dieser Partei
    pub target_session_id: SessionId,
    pub is_initiator: bool,
}

/// Bestaetigung einer Partei (Gateway -> Gegenseite)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeAcceptedData {
    pub bridge_id: BridgeId,
    pub accepted_by: SessionId,
}

/// Ablehnung einer Partei (Gateway -> Gegenseite)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRejectedData {
    pub bridge_id: BridgeId,
    pub rejected_by: SessionId,
}

/// Fehlschlag einer Bruecke (Gateway -> beide Parteien)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeFailedData {
    pub bridge_id: BridgeId,
    pub reason: String,
}

/// Eingehender Anruf aus dem Telefonnetz (Gateway -> Client)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallData {
    pub from: String,
    pub session_id: SessionId,
}

/// Fehlgeschlagener Anrufaufbau (Gateway -> Client)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFailedData {
    pub reason: String,
}

/// Zugewiesene Session-ID beim Verbindungsaufbau (Gateway -> Client)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReadyData {
    pub session_id: SessionId,
}

// ---------------------------------------------------------------------------
// Haupt-Enum: SignalPayload
// ---------------------------------------------------------------------------

/// Alle Signaling-Nachrichten (typsicher via Tagged Enum)
///
/// Serialisiert als `{"type": "...", "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum SignalPayload {
    // Client -> Gateway: Anrufsteuerung
    /// Anruf zu einem Ziel: Session-ID der Gegenseite (Brueckenmodus)
    /// oder Rufnummer (Direktmodus)
    MakeCall(String),
    /// Eingehenden Telefonie-Anruf annehmen (traegt das Browser-Offer)
    AcceptCall(SessionDescription),
    /// Eingehenden Telefonie-Anruf ablehnen
    RejectCall,
    HangUp,

    // Peer-Verhandlung (Direktmodus); `offer` laeuft in beide Richtungen:
    // vom Client bei Neuverhandlung, vom Gateway beim ausgehenden Anruf
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),

    // Client -> Gateway: Brueckenmodus
    AcceptBridgeCall(BridgeRef),
    RejectBridgeCall(BridgeRef),
    BridgeOffer(SessionDescription),
    BridgeAnswer(SessionDescription),
    BridgeIceCandidate(IceCandidate),

    // Gateway -> Client
    BridgeCall(BridgeCallData),
    BridgeAccepted(BridgeAcceptedData),
    BridgeRejected(BridgeRejectedData),
    BridgeEstablishing(BridgeRef),
    BridgeEstablished(BridgeRef),
    SipCallEstablished(BridgeRef),
    BridgeFailed(BridgeFailedData),
    CallFailed(CallFailedData),
    IncomingCall(IncomingCallData),
    SessionReady(SessionReadyData),
}

// ---------------------------------------------------------------------------
// SignalEnvelope (Umschlag)
// ---------------------------------------------------------------------------

/// Signaling-Umschlag: genau eine Nachricht pro Frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEnvelope {
    #[serde(flatten)]
    pub payload: SignalPayload,
    /// Optionale Ziel-/Absender-Session (fuer Broadcast-Zuordnung)
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<SessionId>,
}

impl SignalEnvelope {
    /// Erstellt einen Umschlag ohne Session-Zuordnung
    pub fn neu(payload: SignalPayload) -> Self {
        Self {
            payload,
            session_id: None,
        }
    }

    /// Erstellt einen Umschlag mit Session-Zuordnung
    pub fn mit_session(payload: SignalPayload, session_id: SessionId) -> Self {
        Self {
            payload,
            session_id: Some(session_id),
        }
    }

    /// Erstellt eine `call-failed`-Nachricht
    pub fn call_failed(reason: impl Into<String>) -> Self {
        Self::neu(SignalPayload::CallFailed(CallFailedData {
            reason: reason.into(),
        }))
    }

    /// Erstellt eine `bridge-failed`-Nachricht
    pub fn bridge_failed(bridge_id: BridgeId, reason: impl Into<String>) -> Self {
        Self::neu(SignalPayload::BridgeFailed(BridgeFailedData {
            bridge_id,
            reason: reason.into(),
        }))
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_call_wire_format() {
        let env = SignalEnvelope::neu(SignalPayload::MakeCall("ziel-id".into()));
        let json = env.to_json().unwrap();
        assert!(json.contains(r#""type":"make-call""#), "json: {json}");
        assert!(json.contains(r#""data":"ziel-id""#));
        assert!(!json.contains("sessionId"), "sessionId darf fehlen");
    }

    #[test]
    fn hang_up_ohne_data() {
        let env = SignalEnvelope::neu(SignalPayload::HangUp);
        let json = env.to_json().unwrap();
        assert!(json.contains(r#""type":"hang-up""#));

        let decoded = SignalEnvelope::from_json(r#"{"type":"hang-up"}"#).unwrap();
        assert!(matches!(decoded.payload, SignalPayload::HangUp));
    }

    #[test]
    fn bridge_call_felder_camel_case() {
        let env = SignalEnvelope::neu(SignalPayload::BridgeCall(BridgeCallData {
            bridge_id: BridgeId::new(),
            target_session_id: SessionId::new(),
            is_initiator: true,
        }));
        let json = env.to_json().unwrap();
        assert!(json.contains(r#""type":"bridge-call""#));
        assert!(json.contains("bridgeId"));
        assert!(json.contains("targetSessionId"));
        assert!(json.contains("isInitiator"));
    }

    #[test]
    fn session_id_im_umschlag() {
        let sid = SessionId::new();
        let env = SignalEnvelope::mit_session(
            SignalPayload::IncomingCall(IncomingCallData {
                from: "sip:7001@trunk".into(),
                session_id: sid,
            }),
            sid,
        );
        let json = env.to_json().unwrap();
        assert!(json.contains("sessionId"));

        let decoded = SignalEnvelope::from_json(&json).unwrap();
        assert_eq!(decoded.session_id, Some(sid));
        if let SignalPayload::IncomingCall(data) = decoded.payload {
            assert_eq!(data.from, "sip:7001@trunk");
            assert_eq!(data.session_id, sid);
        } else {
            panic!("Erwartet IncomingCall-Payload");
        }
    }

    #[test]
    fn offer_roundtrip() {
        let env = SignalEnvelope::neu(SignalPayload::Offer(SessionDescription::offer("v=0...")));
        let json = env.to_json().unwrap();
        let decoded = SignalEnvelope::from_json(&json).unwrap();
        if let SignalPayload::Offer(sdp) = decoded.payload {
            assert_eq!(sdp.typ, "offer");
            assert_eq!(sdp.sdp, "v=0...");
        } else {
            panic!("Erwartet Offer-Payload");
        }
    }

    #[test]
    fn ice_candidate_browser_feldnamen() {
        let json = r#"{"type":"ice-candidate","data":{"candidate":"candidate:1 1 UDP ...","sdpMid":"0","sdpMLineIndex":0}}"#;
        let decoded = SignalEnvelope::from_json(json).unwrap();
        if let SignalPayload::IceCandidate(k) = decoded.payload {
            assert_eq!(k.sdp_mid.as_deref(), Some("0"));
            assert_eq!(k.sdp_mline_index, Some(0));
        } else {
            panic!("Erwartet IceCandidate-Payload");
        }
    }

    #[test]
    fn bridge_rejected_traegt_ablehnende_session() {
        let wer = SessionId::new();
        let env = SignalEnvelope::neu(SignalPayload::BridgeRejected(BridgeRejectedData {
            bridge_id: BridgeId::new(),
            rejected_by: wer,
        }));
        let json = env.to_json().unwrap();
        assert!(json.contains("rejectedBy"));

        let decoded = SignalEnvelope::from_json(&json).unwrap();
        if let SignalPayload::BridgeRejected(data) = decoded.payload {
            assert_eq!(data.rejected_by, wer);
        } else {
            panic!("Erwartet BridgeRejected-Payload");
        }
    }

    #[test]
    fn call_failed_helfer() {
        let env = SignalEnvelope::call_failed("unknown destination");
        if let SignalPayload::CallFailed(data) = &env.payload {
            assert_eq!(data.reason, "unknown destination");
        } else {
            panic!("Erwartet CallFailed-Payload");
        }
    }

    #[test]
    fn accept_bridge_call_roundtrip() {
        let bid = BridgeId::new();
        let json = format!(
            r#"{{"type":"accept-bridge-call","data":{{"bridgeId":"{}"}}}}"#,
            bid.inner()
        );
        let decoded = SignalEnvelope::from_json(&json).unwrap();
        if let SignalPayload::AcceptBridgeCall(r) = decoded.payload {
            assert_eq!(r.bridge_id, bid);
        } else {
            panic!("Erwartet AcceptBridgeCall-Payload");
        }
    }
}
