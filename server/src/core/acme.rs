//! ACME subsystem. Automatic certificate issuance with a storage-backed
//! cache.
//!
//! Issuance is on-demand: a TLS handshake for an unknown hostname that
//! passes the admission rule queues an order; the certificate lands in
//! storage and the in-memory cache, and the next handshake succeeds.

use axum::extract::State;
use axum::http::header::HeaderMap;
use instant_acme::{self as acme, Account};
use parking_lot::Mutex;
use rustls::crypto::CryptoProvider;
use rustls::sign::CertifiedKey;
use rustls_pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use std::collections::HashSet;
use std::sync::Arc;
use x509_parser::parse_x509_certificate;

use crate::prelude::*;
use fazt_types::auth_adapter::CertData;

/// Renew certificates expiring within this many days
const RENEWAL_DAYS: i64 = 30;

/// Hostnames with an issuance already in flight
static PENDING: Mutex<Option<HashSet<String>>> = Mutex::new(None);

#[derive(Debug)]
struct X509CertData {
	private_key_pem: Box<str>,
	certificate_pem: Box<str>,
	expires_at: Timestamp,
}

/// The hostname-admission rule: the apex itself or any single-label
/// subdomain of it. Everything else is refused a certificate.
pub fn admit_hostname(hostname: &str, apex: &str) -> bool {
	if hostname == apex {
		return true;
	}
	match hostname.strip_suffix(apex).and_then(|h| h.strip_suffix('.')) {
		Some(label) => !label.is_empty() && !label.contains('.'),
		None => false,
	}
}

/// Queue a background issuance for a hostname, deduplicating concurrent
/// handshakes.
pub fn request_certificate(app: &App, hostname: &str) {
	if !admit_hostname(hostname, &app.opts.apex) {
		debug!("hostname {} refused by admission rule", hostname);
		return;
	}
	if app.opts.acme_email.is_none() {
		return;
	}

	{
		let mut pending = PENDING.lock();
		let pending = pending.get_or_insert_with(HashSet::new);
		if !pending.insert(hostname.to_string()) {
			return;
		}
	}

	let app = app.clone();
	let hostname = hostname.to_string();
	tokio::spawn(async move {
		let result = issue_for_domain(&app, &hostname).await;
		if let Some(pending) = PENDING.lock().as_mut() {
			pending.remove(&hostname);
		}
		match result {
			Ok(()) => info!("ACME issued certificate for {}", hostname),
			Err(err) => warn!("ACME issuance for {} failed: {}", hostname, err),
		}
	});
}

async fn new_account(acme_email: &str) -> FzResult<Account> {
	let contact = format!("mailto:{}", acme_email);
	let (account, _credentials) = Account::builder()
		.map_err(|err| Error::ConfigError(format!("ACME account builder failed: {}", err)))?
		.create(
			&acme::NewAccount {
				contact: &[contact.as_str()],
				terms_of_service_agreed: true,
				only_return_existing: false,
			},
			acme::LetsEncrypt::Production.url().to_owned(),
			None,
		)
		.await
		.map_err(|err| Error::ConfigError(format!("ACME account creation failed: {}", err)))?;

	Ok(account)
}

/// Issue (or renew) the certificate for one domain and persist it
pub async fn issue_for_domain(app: &App, domain: &str) -> FzResult<()> {
	let acme_email = app
		.opts
		.acme_email
		.as_deref()
		.ok_or_else(|| Error::ConfigError("no ACME contact email configured".into()))?;

	let account = new_account(acme_email).await?;
	let cert = order_certificate(app, &account, domain).await?;

	app.auth_adapter
		.create_cert(&CertData {
			domain: domain.into(),
			cert: cert.certificate_pem.clone(),
			key: cert.private_key_pem.clone(),
			expires_at: cert.expires_at,
		})
		.await?;

	insert_cert_cache(app, domain, &cert.certificate_pem, &cert.private_key_pem)?;

	Ok(())
}

fn insert_cert_cache(app: &App, domain: &str, cert_pem: &str, key_pem: &str) -> FzResult<()> {
	let certified_key = Arc::new(
		CertifiedKey::from_der(
			CertificateDer::pem_slice_iter(cert_pem.as_bytes()).filter_map(Result::ok).collect(),
			PrivateKeyDer::from_pem_slice(key_pem.as_bytes())
				.map_err(|_| Error::CryptoError("invalid private key PEM".into()))?,
			CryptoProvider::get_default()
				.ok_or_else(|| Error::CryptoError("no crypto provider".into()))?,
		)
		.map_err(|_| Error::CryptoError("certificate assembly failed".into()))?,
	);

	app.certs
		.write()
		.map_err(|_| Error::ServiceUnavailable("failed to access cert cache".into()))?
		.insert(domain.into(), certified_key);
	Ok(())
}

async fn order_certificate(
	app: &App,
	account: &Account,
	domain: &str,
) -> FzResult<X509CertData> {
	info!("ACME ordering certificate for {}", domain);
	let identifiers = [acme::Identifier::Dns(domain.to_string())];

	let mut order = account
		.new_order(&acme::NewOrder::new(&identifiers))
		.await
		.map_err(acme_err)?;

	if order.state().status == acme::OrderStatus::Pending {
		let mut authorizations = order.authorizations();
		while let Some(result) = authorizations.next().await {
			let mut authz = result.map_err(acme_err)?;
			match authz.status {
				acme::AuthorizationStatus::Pending => {}
				acme::AuthorizationStatus::Valid => continue,
				status => {
					warn!("Unexpected ACME authorization status: {:?}", status);
					continue;
				}
			}

			let mut challenge = authz
				.challenge(acme::ChallengeType::Http01)
				.ok_or_else(|| Error::ConfigError("no HTTP-01 challenge offered".into()))?;
			let identifier = challenge.identifier().to_string().into_boxed_str();
			let token: Box<str> = challenge.key_authorization().as_str().into();
			debug!("ACME challenge for {}", identifier);
			app.acme_challenge_map
				.write()
				.map_err(|_| {
					Error::ServiceUnavailable("failed to access ACME challenge map".into())
				})?
				.insert(identifier, token);

			challenge.set_ready().await.map_err(acme_err)?;
		}

		let retry_policy = acme::RetryPolicy::new()
			.initial_delay(std::time::Duration::from_secs(1))
			.backoff(1.5)
			.timeout(std::time::Duration::from_secs(90));

		let status = order.poll_ready(&retry_policy).await.map_err(acme_err)?;
		if status != acme::OrderStatus::Ready {
			return Err(Error::ConfigError("ACME order did not become ready".into()));
		}

		let private_key_pem = order.finalize().await.map_err(acme_err)?;
		let cert_chain_pem = order.poll_certificate(&retry_policy).await.map_err(acme_err)?;

		app.acme_challenge_map
			.write()
			.map_err(|_| Error::ServiceUnavailable("failed to access ACME challenge map".into()))?
			.remove(domain);

		let pem = pem::parse(&cert_chain_pem)
			.map_err(|_| Error::CryptoError("PEM parsing error".into()))?;
		let (_, parsed_cert) = parse_x509_certificate(pem.contents())
			.map_err(|_| Error::CryptoError("X.509 certificate error".into()))?;
		let not_after = parsed_cert.validity().not_after;

		Ok(X509CertData {
			private_key_pem: private_key_pem.into_boxed_str(),
			certificate_pem: cert_chain_pem.into_boxed_str(),
			expires_at: Timestamp(not_after.timestamp()),
		})
	} else {
		Err(Error::ConfigError("ACME order in unexpected state".into()))
	}
}

fn acme_err(err: acme::Error) -> Error {
	warn!("acme error: {}", err);
	Error::ConfigError("ACME certificate error".into())
}

/// GET /.well-known/acme-challenge/{token} on the plain HTTP listener
pub async fn get_acme_challenge(
	State(state): State<App>,
	headers: HeaderMap,
) -> FzResult<Box<str>> {
	let domain = fazt_types::utils::strip_host_port(
		headers
			.get("host")
			.ok_or(Error::ValidationError("missing host header".into()))?
			.to_str()?,
	);
	debug!("ACME challenge request for {:?}", domain);

	state
		.acme_challenge_map
		.read()
		.map_err(|_| Error::ServiceUnavailable("failed to access ACME challenge map".into()))?
		.get(domain)
		.cloned()
		.ok_or(Error::PermissionDenied)
}

/// Scheduled sweep: reissue certificates nearing expiry
pub async fn renew_expiring_certs(app: &App) -> FzResult<()> {
	if app.opts.acme_email.is_none() {
		return Ok(());
	}

	let threshold = Timestamp::from_now(RENEWAL_DAYS * 86400);
	let certs = app.auth_adapter.list_certs().await?;

	for cert in certs {
		if cert.expires_at < threshold {
			info!("renewing certificate for {}", cert.domain);
			if let Err(err) = issue_for_domain(app, &cert.domain).await {
				error!("renewal for {} failed: {}", cert.domain, err);
			}
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn admission_rule() {
		assert!(admit_hostname("example.com", "example.com"));
		assert!(admit_hostname("demo.example.com", "example.com"));
		assert!(!admit_hostname("a.b.example.com", "example.com"));
		assert!(!admit_hostname("other.org", "example.com"));
		assert!(!admit_hostname("badexample.com", "example.com"));
		assert!(!admit_hostname(".example.com", "example.com"));
	}
}

// vim: ts=4
