//! MQTT 后端（rumqttc 同步客户端）

use crate::backend::{LinkConnector, LinkEvent, LinkHandle, LinkSession};
use crate::client::LinkConfig;
use crate::error::TransportError;
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS, Transport};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// 请求队列容量
const REQUEST_CAPACITY: usize = 64;

/// 生成 `rover-<unix 秒>` 形式的客户端 ID
pub fn default_client_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("rover-{secs}")
}

/// 基于 rumqttc 的连接器
pub struct MqttConnector {
    config: LinkConfig,
}

impl MqttConnector {
    pub fn new(config: LinkConfig) -> Self {
        Self { config }
    }

    fn options(&self) -> MqttOptions {
        let config = &self.config;
        let client_id = config.client_id.clone().unwrap_or_else(default_client_id);
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);
        if let (Some(username), Some(key)) = (&config.username, &config.key) {
            options.set_credentials(username.clone(), key.clone());
        }
        if config.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }
}

impl LinkConnector for MqttConnector {
    fn open(&self) -> Result<(Arc<dyn LinkHandle>, Box<dyn LinkSession>), TransportError> {
        let options = self.options();
        info!(
            "MQTT connecting to {}:{} as {:?} (tls={})",
            self.config.host,
            self.config.port,
            self.config.username.as_deref().unwrap_or("<anonymous>"),
            self.config.use_tls
        );
        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        Ok((
            Arc::new(MqttHandle { client }),
            Box::new(MqttSession { connection }),
        ))
    }
}

struct MqttHandle {
    client: Client,
}

impl LinkHandle for MqttHandle {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)?;
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.client.try_subscribe(topic, QoS::AtLeastOnce)?;
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        self.client.try_disconnect()?;
        Ok(())
    }
}

struct MqttSession {
    connection: Connection,
}

impl LinkSession for MqttSession {
    fn next_event(&mut self) -> Option<Result<LinkEvent, TransportError>> {
        // 未连接时 recv 内部发起连接（受 rumqttc 连接超时约束）；
        // 已连接时 disconnect 请求会唤醒它
        let event = match self.connection.recv() {
            Ok(event) => event,
            Err(_) => return None,
        };
        Some(match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                debug!("MQTT ConnAck: {:?}", ack.code);
                Ok(LinkEvent::Connected)
            },
            Ok(Event::Incoming(Packet::Publish(publish))) => Ok(LinkEvent::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            }),
            Ok(Event::Incoming(Packet::Disconnect)) => Err(TransportError::Connection(
                "broker sent DISCONNECT".to_string(),
            )),
            Ok(_) => Ok(LinkEvent::Idle),
            Err(e) => Err(TransportError::Connection(e.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client_id_format() {
        let id = default_client_id();
        let secs = id.strip_prefix("rover-").unwrap();
        assert!(secs.parse::<u64>().unwrap() > 1_600_000_000);
    }

    #[test]
    fn test_options_from_config() {
        let config = LinkConfig {
            client_id: Some("rover-test".to_string()),
            username: Some("alice".to_string()),
            key: Some("secret".to_string()),
            use_tls: false,
            ..LinkConfig::default()
        };
        let options = MqttConnector::new(config).options();
        assert_eq!(options.client_id(), "rover-test");
        assert_eq!(options.keep_alive(), std::time::Duration::from_secs(60));
        assert_eq!(
            options.credentials(),
            Some(("alice".to_string(), "secret".to_string()))
        );
    }
}
