// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};

use crate::cfg::catalog::{AUTH_TOKEN_OVERRIDE_TITLE_ID, Title};

/// A ready-to-use session descriptor, the output of both credential flows
/// (spec.md §6, Credential Broker contract).
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    pub host: String,
    pub port: u16,
    pub principal_id: String,
    pub password: String,
    /// Populated only for titles selected by `title_id` equality
    /// ([`AUTH_TOKEN_OVERRIDE_TITLE_ID`]); forwarded as `AuthenticationInfo`
    /// on the RPC session rather than derived from principal/password.
    pub auth_info: Option<AuthenticationInfo>,
}

#[derive(Debug, Clone)]
pub struct AuthenticationInfo {
    pub token: String,
    pub ngs_version: u32,
}

/// Device identity presented to the account-server login flow (WiiU-class
/// devices).
#[derive(Debug, Clone)]
pub struct AccountLoginRequest<'a> {
    pub device_id: u32,
    pub serial_number: String,
    pub system_version: u32,
    pub region_id: u8,
    pub country: String,
    pub language: String,
    pub username: String,
    pub password: String,
    pub title: &'a Title,
}

/// Out-of-scope collaborator: mints a [`SessionDescriptor`] by talking to
/// Nintendo's account-server wire protocol. No implementation ships in this
/// crate; callers inject one.
pub trait AccountLoginClient: Send + Sync {
    fn login(
        &self,
        request: AccountLoginRequest<'_>,
    ) -> impl Future<Output = Result<SessionDescriptor>> + Send;
}

/// Device identity presented to the handheld (3DS-class) login flow.
#[derive(Debug, Clone)]
pub struct HandheldLoginRequest<'a> {
    pub serial_number: String,
    pub mac_address: String,
    pub device_cert: Vec<u8>,
    pub region: String,
    pub language: String,
    pub username: String,
    pub username_hmac: String,
    pub title: &'a Title,
}

/// Out-of-scope collaborator for the handheld flow. Unlike
/// [`AccountLoginClient`] this only resolves `{host, port}`; principal-id
/// and password for this flow are supplied out-of-band via environment
/// (spec.md §6).
pub trait HandheldLoginClient: Send + Sync {
    fn login(
        &self,
        request: HandheldLoginRequest<'_>,
    ) -> impl Future<Output = Result<(String, u16)>> + Send;
}

/// Mints a [`SessionDescriptor`] for one title. Implemented by the two
/// device-class flows named in spec.md §6.
pub trait CredentialBroker {
    fn mint(&self, title: &Title) -> impl Future<Output = Result<SessionDescriptor>> + Send;
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing environment variable {name}"))
}

fn env_hex_u32(name: &str) -> Result<u32> {
    let raw = env_var(name)?;
    u32::from_str_radix(raw.trim_start_matches("0x"), 16)
        .with_context(|| format!("{name} is not a hex u32: {raw:?}"))
}

/// Account-server credential flow (spec.md §6 "account-server flow").
/// Reads `DEVICE_ID`, `SERIAL_NUMBER`, `SYSTEM_VERSION`, `REGION_ID`,
/// `COUNTRY`, `LANGUAGE`, `NEX_USERNAME`, `NEX_PASSWORD`, and, for titles
/// matching [`AUTH_TOKEN_OVERRIDE_TITLE_ID`], `NEX_AUTH_TOKEN`.
pub struct AccountServerBroker<C> {
    client: C,
}

impl<C: AccountLoginClient> AccountServerBroker<C> {
    pub fn new(client: C) -> Self {
        AccountServerBroker { client }
    }
}

impl<C: AccountLoginClient + Sync> CredentialBroker for AccountServerBroker<C> {
    async fn mint(&self, title: &Title) -> Result<SessionDescriptor> {
        let request = AccountLoginRequest {
            device_id: env_var("DEVICE_ID")?
                .parse()
                .context("DEVICE_ID is not a valid u32")?,
            serial_number: env_var("SERIAL_NUMBER")?,
            system_version: env_hex_u32("SYSTEM_VERSION")?,
            region_id: env_var("REGION_ID")?
                .parse()
                .context("REGION_ID is not a valid u8")?,
            country: env_var("COUNTRY")?,
            language: env_var("LANGUAGE")?,
            username: env_var("NEX_USERNAME")?,
            password: env_var("NEX_PASSWORD")?,
            title,
        };

        let mut descriptor = self.client.login(request).await?;

        if title.title_id == AUTH_TOKEN_OVERRIDE_TITLE_ID {
            descriptor.auth_info = Some(AuthenticationInfo {
                token: env_var("NEX_AUTH_TOKEN")?,
                ngs_version: 2,
            });
        }

        Ok(descriptor)
    }
}

/// Handheld credential flow (spec.md §6 "handheld flow"). `{host, port}`
/// come from the injected [`HandheldLoginClient`]; `principal_id` and
/// `password` come straight from `3DS_PID`/`3DS_PASSWORD`.
pub struct HandheldBroker<C> {
    client: C,
}

impl<C: HandheldLoginClient> HandheldBroker<C> {
    pub fn new(client: C) -> Self {
        HandheldBroker { client }
    }
}

impl<C: HandheldLoginClient + Sync> CredentialBroker for HandheldBroker<C> {
    async fn mint(&self, title: &Title) -> Result<SessionDescriptor> {
        let device_cert = hex::decode(env_var("3DS_FCD_CERT")?)
            .context("3DS_FCD_CERT is not valid hex")?;

        let request = HandheldLoginRequest {
            serial_number: env_var("3DS_SERIAL_NUMBER")?,
            mac_address: env_var("3DS_MAC_ADDRESS")?,
            device_cert,
            region: env_var("3DS_REGION")?,
            language: env_var("3DS_LANG")?,
            username: env_var("3DS_USERNAME")?,
            username_hmac: env_var("3DS_USERNAME_HMAC")?,
            title,
        };

        let (host, port) = self.client.login(request).await?;

        Ok(SessionDescriptor {
            host,
            port,
            principal_id: env_var("3DS_PID")?,
            password: env_var("3DS_PASSWORD")?,
            auth_info: None,
        })
    }
}
