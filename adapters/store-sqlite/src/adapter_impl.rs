//! Trait implementations wiring the SQL modules to the adapter surface

use async_trait::async_trait;

use crate::{db_err, StoreSqlite};
use fazt_types::auth_adapter::{
	ApiKeyInfo, AuditEvent, AuditEventRow, AuthAdapter, AuthCtx, CertData, CreateApiKeyOptions,
	CreateInvite, CreateUser, CreatedApiKey, CreatedSession, Invite, OauthState, User,
};
use fazt_types::meta_adapter::{
	AliasRecord, AliasTarget, AppRecord, CreateEgressRule, DeploymentInfo, DeploymentRow,
	EgressRule, MetaAdapter, NewVfsFile, PageView, UpdateApp, UpsertApp, VfsFile, VfsFileMeta,
};
use fazt_types::prelude::*;

#[async_trait]
impl AuthAdapter for StoreSqlite {
	async fn create_user(&self, data: &CreateUser<'_>) -> FzResult<User> {
		crate::user::create_user(self, data).await
	}

	async fn read_user(&self, user_id: &str) -> FzResult<User> {
		crate::user::read_user(self, user_id).await
	}

	async fn read_user_by_email(&self, email: &str) -> FzResult<User> {
		crate::user::read_user_by_email(self, email).await
	}

	async fn list_users(&self) -> FzResult<Vec<User>> {
		crate::user::list_users(self).await
	}

	async fn update_user_role(&self, user_id: &str, role: Role) -> FzResult<User> {
		crate::user::update_user_role(self, user_id, role).await
	}

	async fn update_user_profile(
		&self,
		user_id: &str,
		name: Option<&str>,
		avatar_url: Patch<&str>,
	) -> FzResult<User> {
		crate::user::update_user_profile(self, user_id, name, avatar_url).await
	}

	async fn delete_user(&self, user_id: &str) -> FzResult<()> {
		crate::user::delete_user(self, user_id).await
	}

	async fn check_password(&self, email: &str, password: &str) -> FzResult<User> {
		crate::user::check_password(self, email, password).await
	}

	async fn set_password(&self, user_id: &str, password: &str) -> FzResult<()> {
		crate::user::set_password(self, user_id, password).await
	}

	async fn create_session(&self, user_id: &str, ttl: i64) -> FzResult<CreatedSession> {
		crate::session::create_session(self, user_id, ttl).await
	}

	async fn validate_session(&self, token: &str) -> FzResult<AuthCtx> {
		crate::session::validate_session(self, token).await
	}

	async fn delete_session(&self, token: &str) -> FzResult<()> {
		crate::session::delete_session(self, token).await
	}

	async fn purge_expired_sessions(&self) -> FzResult<u32> {
		let sessions = crate::session::purge_expired_sessions(self).await?;
		let states = crate::oauth::purge_expired_oauth_states(self).await?;
		Ok(sessions + states)
	}

	async fn create_invite(&self, data: &CreateInvite<'_>) -> FzResult<Invite> {
		crate::invite::create_invite(self, data).await
	}

	async fn list_invites(&self) -> FzResult<Vec<Invite>> {
		crate::invite::list_invites(self).await
	}

	async fn read_invite(&self, code: &str) -> FzResult<Invite> {
		crate::invite::read_invite(self, code).await
	}

	async fn delete_invite(&self, code: &str) -> FzResult<()> {
		crate::invite::delete_invite(self, code).await
	}

	async fn redeem_invite(
		&self,
		code: &str,
		email: &str,
		name: &str,
		password: Option<&str>,
	) -> FzResult<User> {
		crate::invite::redeem_invite(self, code, email, name, password).await
	}

	async fn create_oauth_state(&self, provider: &str, ttl: i64) -> FzResult<Box<str>> {
		crate::oauth::create_oauth_state(self, provider, ttl).await
	}

	async fn consume_oauth_state(&self, state: &str) -> FzResult<OauthState> {
		crate::oauth::consume_oauth_state(self, state).await
	}

	async fn upsert_oauth_user(&self, data: &CreateUser<'_>) -> FzResult<User> {
		crate::oauth::upsert_oauth_user(self, data).await
	}

	async fn create_api_key(&self, opts: &CreateApiKeyOptions<'_>) -> FzResult<CreatedApiKey> {
		crate::api_key::create_api_key(self, opts).await
	}

	async fn validate_api_key(&self, key: &str) -> FzResult<AuthCtx> {
		crate::api_key::validate_api_key(self, key).await
	}

	async fn list_api_keys(&self) -> FzResult<Vec<ApiKeyInfo>> {
		crate::api_key::list_api_keys(self).await
	}

	async fn delete_api_key(&self, key_id: i64) -> FzResult<()> {
		crate::api_key::delete_api_key(self, key_id).await
	}

	async fn create_cert(&self, data: &CertData) -> FzResult<()> {
		crate::cert::create_cert(self, data).await
	}

	async fn read_cert_by_domain(&self, domain: &str) -> FzResult<CertData> {
		crate::cert::read_cert_by_domain(self, domain).await
	}

	async fn list_certs(&self) -> FzResult<Vec<CertData>> {
		crate::cert::list_certs(self).await
	}

	async fn read_var(&self, key: &str) -> FzResult<Box<str>> {
		crate::cert::read_var(self, key).await
	}

	async fn write_var(&self, key: &str, value: &str) -> FzResult<()> {
		crate::cert::write_var(self, key, value).await
	}

	async fn create_audit_event(&self, ev: &AuditEvent<'_>) -> FzResult<()> {
		crate::audit::create_audit_event(self, ev).await
	}

	async fn list_audit_events(&self, limit: u32) -> FzResult<Vec<AuditEventRow>> {
		crate::audit::list_audit_events(self, limit).await
	}

	async fn ping(&self) -> FzResult<()> {
		sqlx::query_scalar::<_, i64>("SELECT 1")
			.fetch_one(self.read())
			.await
			.map_err(db_err)?;
		Ok(())
	}

	async fn close(&self) {
		StoreSqlite::close(self).await;
	}
}

#[async_trait]
impl MetaAdapter for StoreSqlite {
	async fn read_app(&self, app_id: &str) -> FzResult<AppRecord> {
		crate::app::read_app(self, app_id).await
	}

	async fn list_apps(&self) -> FzResult<Vec<AppRecord>> {
		crate::app::list_apps(self).await
	}

	async fn create_app(&self, data: &UpsertApp<'_>) -> FzResult<AppRecord> {
		crate::app::create_app(self, data).await
	}

	async fn update_app(&self, app_id: &str, data: &UpdateApp) -> FzResult<AppRecord> {
		crate::app::update_app(self, app_id, data).await
	}

	async fn delete_app(&self, app_id: &str, cascade: bool) -> FzResult<()> {
		crate::app::delete_app(self, app_id, cascade).await
	}

	async fn read_lineage(&self, app_id: &str) -> FzResult<Vec<AppRecord>> {
		crate::app::read_lineage(self, app_id).await
	}

	async fn fork_app(
		&self,
		parent_id: &str,
		new_site: &str,
		title: Option<&str>,
		copy_kv: bool,
	) -> FzResult<AppRecord> {
		crate::app::fork_app(self, parent_id, new_site, title, copy_kv).await
	}

	async fn read_file(&self, site_id: &str, path: &str) -> FzResult<VfsFile> {
		crate::vfs::read_file(self, site_id, path).await
	}

	async fn read_file_meta(&self, site_id: &str, path: &str) -> FzResult<VfsFileMeta> {
		crate::vfs::read_file_meta(self, site_id, path).await
	}

	async fn list_files(&self, site_id: &str) -> FzResult<Vec<VfsFileMeta>> {
		crate::vfs::list_files(self, site_id).await
	}

	async fn write_file(&self, site_id: &str, file: &NewVfsFile) -> FzResult<VfsFileMeta> {
		crate::vfs::write_file(self, site_id, file).await
	}

	async fn delete_file(&self, site_id: &str, path: &str) -> FzResult<()> {
		crate::vfs::delete_file(self, site_id, path).await
	}

	async fn replace_site(
		&self,
		app: &UpsertApp<'_>,
		files: &[NewVfsFile],
		deployment: &DeploymentInfo<'_>,
	) -> FzResult<AppRecord> {
		crate::vfs::replace_site(self, app, files, deployment).await
	}

	async fn copy_site_files(&self, from_site: &str, to_site: &str) -> FzResult<u32> {
		crate::vfs::copy_site_files(self, from_site, to_site).await
	}

	async fn list_deployments(&self, app_id: &str) -> FzResult<Vec<DeploymentRow>> {
		crate::vfs::list_deployments(self, app_id).await
	}

	async fn read_app_site(&self, app_id: &str) -> FzResult<Box<str>> {
		crate::vfs::read_app_site(self, app_id).await
	}

	async fn read_alias(&self, subdomain: &str) -> FzResult<AliasRecord> {
		crate::alias::read_alias(self, subdomain).await
	}

	async fn list_aliases(&self) -> FzResult<Vec<AliasRecord>> {
		crate::alias::list_aliases(self).await
	}

	async fn upsert_alias(&self, subdomain: &str, target: &AliasTarget) -> FzResult<AliasRecord> {
		crate::alias::upsert_alias(self, subdomain, target).await
	}

	async fn delete_alias(&self, subdomain: &str) -> FzResult<()> {
		crate::alias::delete_alias(self, subdomain).await
	}

	async fn swap_aliases(&self, alias1: &str, alias2: &str) -> FzResult<()> {
		crate::alias::swap_aliases(self, alias1, alias2).await
	}

	async fn kv_get(&self, app_id: &str, user_id: &str, key: &str) -> FzResult<Option<Box<str>>> {
		crate::kv::kv_get(self, app_id, user_id, key).await
	}

	async fn kv_set(&self, app_id: &str, user_id: &str, key: &str, value: &str) -> FzResult<()> {
		crate::kv::kv_set(self, app_id, user_id, key, value).await
	}

	async fn kv_delete(&self, app_id: &str, user_id: &str, key: &str) -> FzResult<bool> {
		crate::kv::kv_delete(self, app_id, user_id, key).await
	}

	async fn kv_find(
		&self,
		app_id: &str,
		user_id: &str,
		prefix: &str,
		limit: u32,
	) -> FzResult<Vec<(Box<str>, Box<str>)>> {
		crate::kv::kv_find(self, app_id, user_id, prefix, limit).await
	}

	async fn copy_app_kv(&self, from_app: &str, to_app: &str) -> FzResult<u32> {
		crate::kv::copy_app_kv(self, from_app, to_app).await
	}

	async fn list_egress_rules(&self) -> FzResult<Vec<EgressRule>> {
		crate::egress::list_egress_rules(self).await
	}

	async fn create_egress_rule(&self, data: &CreateEgressRule<'_>) -> FzResult<EgressRule> {
		crate::egress::create_egress_rule(self, data).await
	}

	async fn delete_egress_rule(&self, rule_id: i64) -> FzResult<()> {
		crate::egress::delete_egress_rule(self, rule_id).await
	}

	async fn record_page_views(&self, views: &[PageView]) -> FzResult<()> {
		crate::audit::record_page_views(self, views).await
	}
}

// vim: ts=4
