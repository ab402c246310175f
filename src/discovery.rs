use crate::config::SessionConfig;
use crate::connection::Connection;
use crate::error::{DutchDutchError, Result};
use crate::probe::probe;
use crate::protocol::{Endpoint, Method, Request, TargetType};
use crate::types::{DeviceIdentity, Targets};
use serde_json::Value;
use std::net::Ipv4Addr;

/// What the master speaker says about itself
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MasterInfo {
    pub identity: DeviceIdentity,
    pub target: String,
    pub url: String,
}

/// Result of a successful discovery, ready to enter steady state
pub(crate) struct Bootstrapped {
    pub identity: DeviceIdentity,
    pub master_url: String,
    pub targets: Targets,
    /// Reply data of the full network read
    pub network: Value,
    /// Open connection to the master; nothing else reads from it yet
    pub connection: Connection,
}

/// Run the discovery sequence against the configured speaker
///
/// Every step must succeed for the next to run. The first failure aborts
/// the whole sequence and is returned to the caller.
pub(crate) async fn bootstrap(
    config: &SessionConfig,
    http: &reqwest::Client,
) -> Result<Bootstrapped> {
    if !probe(http, &config.probe_url()).await {
        return Err(DutchDutchError::Unreachable(config.host.clone()));
    }

    // The configured speaker may be either unit; ask it who the master is
    let mut connection = Connection::connect(&config.default_ws_url(), config.heartbeat).await?;
    let master = read(&mut connection, Request::new(Endpoint::Master, Method::Read), config).await;
    connection.close();
    let master = parse_master(&master?)?;
    tracing::info!(
        "Pair {} (firmware {}) is mastered at {}",
        master.identity.serial,
        master.identity.version,
        master.url
    );

    let mut connection = Connection::connect(&master.url, config.heartbeat).await?;

    let request = Request::new(Endpoint::Targets, Method::Read).with_target(TargetType::Room, "*");
    let targets = classify_targets(&read(&mut connection, request, config).await?, &master.target)?;
    tracing::debug!("Resolved targets {:?}", targets);

    let request = Request::new(Endpoint::Network, Method::Read)
        .with_target(TargetType::Room, targets.room.as_str());
    let reply = connection.send_request(&request, config.request_timeout).await?;
    if reply.meta.endpoint.as_deref() != Some(Endpoint::Network.as_str()) {
        return Err(DutchDutchError::InvalidResponse(
            "network read answered by another endpoint".to_string(),
        ));
    }

    Ok(Bootstrapped {
        identity: master.identity,
        master_url: master.url,
        targets,
        network: reply.data,
        connection,
    })
}

async fn read(
    connection: &mut Connection,
    request: Request,
    config: &SessionConfig,
) -> Result<Value> {
    let reply = connection.send_request(&request, config.request_timeout).await?;
    Ok(reply.data)
}

/// Extract identity and the WebSocket URL of the master from a `master` reply
pub(crate) fn parse_master(data: &Value) -> Result<MasterInfo> {
    let field = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DutchDutchError::missing(key))
    };

    let identity = DeviceIdentity {
        serial: field("name")?,
        version: field("version")?,
    };
    let target = field("target")?;

    let addresses = data
        .pointer("/address/ipv4")
        .and_then(Value::as_array)
        .ok_or_else(|| DutchDutchError::missing("address.ipv4"))?;
    let ip = select_master_address(addresses).ok_or_else(|| {
        DutchDutchError::InvalidResponse("no routable IPv4 address reported yet".to_string())
    })?;

    let port = match data.pointer("/address/port_ascend") {
        Some(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| DutchDutchError::missing("address.port_ascend"))?;

    Ok(MasterInfo {
        identity,
        target,
        url: format!("ws://{}:{}", ip, port),
    })
}

/// Pick the first dotted-quad address outside the link-local block
///
/// Speakers report `169.254.x.x` while still booting; such addresses are
/// skipped so the next poll can pick up the real one.
pub(crate) fn select_master_address(addresses: &[Value]) -> Option<Ipv4Addr> {
    addresses
        .iter()
        .filter_map(Value::as_str)
        .filter_map(parse_dotted_quad)
        .find(|ip| {
            if ip.is_link_local() {
                tracing::debug!("Ignoring link-local address {}", ip);
                false
            } else {
                true
            }
        })
}

/// Parse `a.b.c.d`, allowing zero-padded octets such as `192.168.001.020`
fn parse_dotted_quad(s: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = s.split('.');
    for octet in &mut octets {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

/// Classify the entries of a `targets` reply
///
/// The reply order is not guaranteed. The room entry becomes the room target
/// and the device that is not the master becomes the slave.
pub(crate) fn classify_targets(data: &Value, master: &str) -> Result<Targets> {
    let entries = data
        .as_array()
        .ok_or_else(|| DutchDutchError::InvalidResponse("targets is not a list".to_string()))?;

    let mut room = None;
    let mut slave = None;
    for entry in entries {
        let Some(target) = entry.get("target").and_then(Value::as_str) else {
            continue;
        };
        match entry.get("targetType").and_then(Value::as_str) {
            Some("room") => room = Some(target.to_string()),
            Some("device") if target != master => slave = Some(target.to_string()),
            _ => {}
        }
    }

    Ok(Targets {
        room: room.ok_or_else(|| DutchDutchError::missing("room target"))?,
        master: master.to_string(),
        slave,
    })
}
