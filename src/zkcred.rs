//! ZK Credential Facade
//!
//! Wraps the zkgroup anonymous-credential scheme: group auth credential
//! issuance and presentation verification, expiring profile key credentials,
//! and the generic-credential flavors used by backups and call links. The
//! three parameter bundles are process-wide immutable state seeded at server
//! construction.

use libsignal_protocol::{Aci, Pni};
use rand::{CryptoRng, Rng};
use zkgroup::auth::{AnyAuthCredentialPresentation, AuthCredentialWithPniZkcResponse};
use zkgroup::backups::{
    BackupAuthCredentialPresentation, BackupAuthCredentialRequest, BackupLevel,
};
use zkgroup::call_links::{CallLinkAuthCredentialResponse, CreateCallLinkCredentialRequest};
use zkgroup::generic_server_params::{GenericServerPublicParams, GenericServerSecretParams};
use zkgroup::groups::{GroupPublicParams, UuidCiphertext};
use zkgroup::profiles::{ProfileKeyCommitment, ProfileKeyCredentialRequest};
use zkgroup::{RandomnessBytes, ServerPublicParams, ServerSecretParams, Timestamp, RANDOMNESS_LEN};

use crate::error::ServerResult;

/// The server-side credential parameter bundles: the group/profile params and
/// the two generic-credential params (call links, backups).
pub struct ZkParams {
    pub server_secret: ServerSecretParams,
    pub generic_secret: GenericServerSecretParams,
    pub backup_secret: GenericServerSecretParams,
}

/// Who an auth credential presentation says the caller is, as ciphertexts
/// under the group's secret params.
pub struct GroupAuthClaims {
    pub aci_ciphertext: UuidCiphertext,
    pub pni_ciphertext: Option<UuidCiphertext>,
}

fn randomness<R: Rng + CryptoRng>(rng: &mut R) -> RandomnessBytes {
    let mut bytes = [0u8; RANDOMNESS_LEN];
    rng.fill(&mut bytes);
    bytes
}

impl ZkParams {
    /// Generates fresh parameter bundles.
    pub fn generate<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        ZkParams {
            server_secret: ServerSecretParams::generate(randomness(rng)),
            generic_secret: GenericServerSecretParams::generate(randomness(rng)),
            backup_secret: GenericServerSecretParams::generate(randomness(rng)),
        }
    }

    pub fn server_public(&self) -> ServerPublicParams {
        self.server_secret.get_public_params()
    }

    pub fn generic_public(&self) -> GenericServerPublicParams {
        self.generic_secret.get_public_params()
    }

    pub fn backup_public(&self) -> GenericServerPublicParams {
        self.backup_secret.get_public_params()
    }

    // ========================================================================
    // Groups
    // ========================================================================

    /// Verifies a group auth credential presentation against the group's
    /// public params and returns the caller's member ciphertexts.
    pub fn verify_group_auth(
        &self,
        group_public_params: &[u8],
        presentation: &[u8],
        now_secs: u64,
    ) -> ServerResult<GroupAuthClaims> {
        let group_params: GroupPublicParams = zkgroup::deserialize(group_public_params)?;
        let presentation = AnyAuthCredentialPresentation::new(presentation)?;
        self.server_secret.verify_auth_credential_presentation(
            group_params,
            &presentation,
            Timestamp::from_epoch_seconds(now_secs),
        )?;
        Ok(GroupAuthClaims {
            aci_ciphertext: presentation.get_uuid_ciphertext(),
            pni_ciphertext: presentation.get_pni_ciphertext(),
        })
    }

    /// Issues a day-aligned group auth credential for (ACI, PNI).
    pub fn issue_group_auth_credential<R: Rng + CryptoRng>(
        &self,
        aci: Aci,
        pni: Pni,
        redemption_secs: u64,
        rng: &mut R,
    ) -> Vec<u8> {
        let response = AuthCredentialWithPniZkcResponse::issue_credential(
            aci,
            pni,
            Timestamp::from_epoch_seconds(redemption_secs),
            &self.server_secret,
            randomness(rng),
        );
        zkgroup::serialize(&response)
    }

    // ========================================================================
    // Profile keys
    // ========================================================================

    /// Issues an expiring profile key credential against the stored profile
    /// key commitment.
    pub fn issue_profile_key_credential<R: Rng + CryptoRng>(
        &self,
        request: &[u8],
        aci: Aci,
        commitment: &[u8],
        expiration_secs: u64,
        rng: &mut R,
    ) -> ServerResult<Vec<u8>> {
        let request: ProfileKeyCredentialRequest = zkgroup::deserialize(request)?;
        let commitment: ProfileKeyCommitment = zkgroup::deserialize(commitment)?;
        let response = self.server_secret.issue_expiring_profile_key_credential(
            randomness(rng),
            &request,
            aci,
            commitment,
            Timestamp::from_epoch_seconds(expiration_secs),
        )?;
        Ok(zkgroup::serialize(&response))
    }

    // ========================================================================
    // Backups
    // ========================================================================

    /// Issues one backup auth credential for a day-aligned redemption time.
    pub fn issue_backup_auth_credential<R: Rng + CryptoRng>(
        &self,
        request: &[u8],
        redemption_secs: u64,
        rng: &mut R,
    ) -> ServerResult<Vec<u8>> {
        let request: BackupAuthCredentialRequest = zkgroup::deserialize(request)?;
        let response = request.issue(
            Timestamp::from_epoch_seconds(redemption_secs),
            BackupLevel::Messages,
            &self.backup_secret,
            randomness(rng),
        );
        Ok(zkgroup::serialize(&response))
    }

    /// Verifies a backup auth credential presentation (the first of the dual
    /// `x-signal-zk-auth` headers; the signature half is checked against the
    /// account's registered backup public key by the caller).
    pub fn verify_backup_presentation(
        &self,
        presentation: &[u8],
        now_secs: u64,
    ) -> ServerResult<BackupAuthCredentialPresentation> {
        let presentation: BackupAuthCredentialPresentation = zkgroup::deserialize(presentation)?;
        presentation.verify(Timestamp::from_epoch_seconds(now_secs), &self.backup_secret)?;
        Ok(presentation)
    }

    // ========================================================================
    // Call links
    // ========================================================================

    /// Issues a create-call-link credential for the requesting ACI.
    pub fn issue_create_call_link_credential<R: Rng + CryptoRng>(
        &self,
        request: &[u8],
        aci: Aci,
        timestamp_secs: u64,
        rng: &mut R,
    ) -> ServerResult<Vec<u8>> {
        let request: CreateCallLinkCredentialRequest = zkgroup::deserialize(request)?;
        let response = request.issue(
            aci,
            Timestamp::from_epoch_seconds(timestamp_secs),
            &self.generic_secret,
            randomness(rng),
        );
        Ok(zkgroup::serialize(&response))
    }

    /// Issues a call-link auth credential for an existing link.
    pub fn issue_call_link_auth_credential<R: Rng + CryptoRng>(
        &self,
        aci: Aci,
        redemption_secs: u64,
        rng: &mut R,
    ) -> Vec<u8> {
        let response = CallLinkAuthCredentialResponse::issue_credential(
            aci,
            Timestamp::from_epoch_seconds(redemption_secs),
            &self.generic_secret,
            randomness(rng),
        );
        zkgroup::serialize(&response)
    }
}

/// Seconds since the epoch, truncated to the start of the day. Credential
/// redemption times are always day-aligned.
pub fn day_aligned(now_secs: u64) -> u64 {
    now_secs - (now_secs % 86_400)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    const DAY: u64 = 86_400;

    #[test]
    fn test_day_alignment() {
        assert_eq!(day_aligned(0), 0);
        assert_eq!(day_aligned(DAY + 5), DAY);
        assert_eq!(day_aligned(3 * DAY - 1), 2 * DAY);
    }

    #[test]
    fn test_backup_credential_issue_and_present() {
        let mut rng = OsRng;
        let params = ZkParams::generate(&mut rng);

        let backup_key = [0x46u8; 32];
        let aci = uuid::uuid!("c0fc16e4-bae5-4343-9f0d-e7ecf4251343");
        let redemption = day_aligned(1_681_344_000);

        let request_context =
            zkgroup::backups::BackupAuthCredentialRequestContext::new(&backup_key, &aci);
        let request = zkgroup::serialize(&request_context.get_request());

        let blinded = params
            .issue_backup_auth_credential(&request, redemption, &mut rng)
            .unwrap();
        let blinded = zkgroup::deserialize(&blinded).unwrap();

        let credential = request_context
            .receive(blinded, &params.backup_public(), BackupLevel::Messages)
            .expect("credential should be valid");
        let presentation = credential.present(&params.backup_public(), randomness(&mut rng));

        params
            .verify_backup_presentation(&zkgroup::serialize(&presentation), redemption)
            .expect("presentation should verify");
    }

    #[test]
    fn test_backup_presentation_rejected_by_other_params() {
        let mut rng = OsRng;
        let params = ZkParams::generate(&mut rng);
        let other = ZkParams::generate(&mut rng);

        let backup_key = [0x47u8; 32];
        let aci = uuid::Uuid::new_v4();
        let redemption = day_aligned(1_681_344_000);

        let request_context =
            zkgroup::backups::BackupAuthCredentialRequestContext::new(&backup_key, &aci);
        let request = zkgroup::serialize(&request_context.get_request());

        let blinded = params
            .issue_backup_auth_credential(&request, redemption, &mut rng)
            .unwrap();
        let blinded = zkgroup::deserialize(&blinded).unwrap();
        let credential = request_context
            .receive(blinded, &params.backup_public(), BackupLevel::Messages)
            .unwrap();
        let presentation = credential.present(&params.backup_public(), randomness(&mut rng));

        assert!(other
            .verify_backup_presentation(&zkgroup::serialize(&presentation), redemption)
            .is_err());
    }

    #[test]
    fn test_group_auth_credential_roundtrip() {
        let mut rng = OsRng;
        let params = ZkParams::generate(&mut rng);

        let aci = Aci::from(uuid::Uuid::new_v4());
        let pni = Pni::from(uuid::Uuid::new_v4());
        let redemption = day_aligned(1_681_344_000);

        let response = params.issue_group_auth_credential(aci, pni, redemption, &mut rng);
        let response: AuthCredentialWithPniZkcResponse =
            zkgroup::deserialize(&response).unwrap();

        let server_public = params.server_public();
        let credential = response
            .receive(
                aci,
                pni,
                Timestamp::from_epoch_seconds(redemption),
                &server_public,
            )
            .expect("credential should be valid");

        let master_key = zkgroup::groups::GroupMasterKey::new([0x2au8; 32]);
        let group_secret =
            zkgroup::groups::GroupSecretParams::derive_from_master_key(master_key);
        let presentation =
            credential.present(&server_public, &group_secret, randomness(&mut rng));

        let claims = params
            .verify_group_auth(
                &zkgroup::serialize(&group_secret.get_public_params()),
                &zkgroup::serialize(&presentation),
                redemption,
            )
            .expect("presentation should verify");

        let expected = group_secret.encrypt_service_id(aci.into());
        assert_eq!(
            zkgroup::serialize(&claims.aci_ciphertext),
            zkgroup::serialize(&expected)
        );
    }

    #[test]
    fn test_call_link_auth_credential_issues() {
        let mut rng = OsRng;
        let params = ZkParams::generate(&mut rng);
        let credential = params.issue_call_link_auth_credential(
            Aci::from(uuid::Uuid::new_v4()),
            day_aligned(1_681_344_000),
            &mut rng,
        );
        assert!(!credential.is_empty());
    }
}
