//! Signed `state` parameter for the QuickBooks authorization round trip.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::security::csrf::CsrfManager;

const STATE_TTL_SECS: i64 = 600;

/// Binds the callback to the company and browser session that started it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QboState {
    pub nonce: String,
    pub company_id: Uuid,
    pub session_id: Uuid,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("state is malformed")]
    Malformed,
    #[error("state signature does not match")]
    BadSignature,
    #[error("state has expired")]
    Expired,
    #[error("state was issued for another session")]
    WrongSession,
}

impl QboState {
    pub fn new(company_id: Uuid, session_id: Uuid) -> Self {
        Self {
            nonce: Uuid::new_v4().simple().to_string(),
            company_id,
            session_id,
            created_at: Utc::now().timestamp(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() - self.created_at > STATE_TTL_SECS
    }

    /// `{base64url(json)}.{signature}`
    pub fn encode(&self, signer: &CsrfManager) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json.as_bytes());
        let signature = signer.sign(&payload);
        format!("{payload}.{signature}")
    }

    pub fn decode(encoded: &str, signer: &CsrfManager) -> Result<Self, StateError> {
        let (payload, signature) = encoded.split_once('.').ok_or(StateError::Malformed)?;
        if !signer.verify_signature(payload, signature) {
            return Err(StateError::BadSignature);
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| StateError::Malformed)?;
        let state: Self = serde_json::from_slice(&bytes).map_err(|_| StateError::Malformed)?;
        if state.is_expired() {
            return Err(StateError::Expired);
        }
        Ok(state)
    }

    pub fn verify_for(
        encoded: &str,
        signer: &CsrfManager,
        company_id: Uuid,
        session_id: Uuid,
    ) -> Result<Self, StateError> {
        let state = Self::decode(encoded, signer)?;
        if state.company_id != company_id || state.session_id != session_id {
            return Err(StateError::WrongSession);
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> CsrfManager {
        CsrfManager::new(b"qbo-state-secret-qbo-state-secret".to_vec())
    }

    #[test]
    fn test_state_round_trip() {
        let company = Uuid::new_v4();
        let session = Uuid::new_v4();
        let encoded = QboState::new(company, session).encode(&signer());
        let decoded = QboState::verify_for(&encoded, &signer(), company, session).unwrap();
        assert_eq!(decoded.company_id, company);
    }

    #[test]
    fn test_tampered_state_rejected() {
        let encoded = QboState::new(Uuid::new_v4(), Uuid::new_v4()).encode(&signer());
        let forged = QboState::new(Uuid::new_v4(), Uuid::new_v4());
        let forged_payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_string(&forged).unwrap().as_bytes());
        let (_, signature) = encoded.split_once('.').unwrap();
        let tampered = format!("{forged_payload}.{signature}");

        assert_eq!(QboState::decode(&tampered, &signer()), Err(StateError::BadSignature));
        assert_eq!(QboState::decode("nodot", &signer()), Err(StateError::Malformed));
        let other = CsrfManager::new(b"another-secret-another-secret-xx".to_vec());
        assert_eq!(QboState::decode(&encoded, &other), Err(StateError::BadSignature));
    }

    #[test]
    fn test_expired_and_wrong_session() {
        let company = Uuid::new_v4();
        let session = Uuid::new_v4();
        let mut state = QboState::new(company, session);
        state.created_at -= STATE_TTL_SECS + 5;
        assert_eq!(
            QboState::decode(&state.encode(&signer()), &signer()),
            Err(StateError::Expired)
        );

        let fresh = QboState::new(company, session).encode(&signer());
        assert_eq!(
            QboState::verify_for(&fresh, &signer(), company, Uuid::new_v4()),
            Err(StateError::WrongSession)
        );
    }
}
