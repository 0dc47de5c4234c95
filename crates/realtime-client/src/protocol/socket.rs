use serde_json::Value;

use crate::RealtimeError;

const DEFAULT_NAMESPACE: &str = "/";

/// A Socket.IO packet addressed to a namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    pub fn event(namespace: &str, name: &str, args: Vec<Value>) -> Self {
        Self::Event {
            namespace: namespace.to_string(),
            id: None,
            name: name.to_string(),
            args,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::Ack { namespace, .. }
            | Self::ConnectError { namespace, .. } => namespace,
        }
    }

    pub fn encode(&self) -> String {
        let (kind, id, data) = match self {
            Self::Connect { data, .. } => ('0', None, data.clone()),
            Self::Disconnect { .. } => ('1', None, None),
            Self::Event { id, name, args, .. } => {
                let mut array = Vec::with_capacity(args.len() + 1);
                array.push(Value::String(name.clone()));
                array.extend(args.iter().cloned());
                ('2', *id, Some(Value::Array(array)))
            }
            Self::Ack { id, args, .. } => ('3', Some(*id), Some(Value::Array(args.clone()))),
            Self::ConnectError { data, .. } => ('4', None, data.clone()),
        };

        let mut out = String::new();
        out.push(kind);
        let namespace = self.namespace();
        if namespace != DEFAULT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }
        if let Some(id) = id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = data {
            out.push_str(&data.to_string());
        }
        out
    }

    pub fn decode(text: &str) -> Result<Self, RealtimeError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| RealtimeError::Protocol("empty socket packet".into()))?;
        let rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(RealtimeError::Protocol(
                "binary socket packets are not supported".into(),
            ));
        }

        let (namespace, rest) = if rest.starts_with('/') {
            match rest.find(',') {
                Some(i) => (&rest[..i], &rest[i + 1..]),
                None => (rest, ""),
            }
        } else {
            (DEFAULT_NAMESPACE, rest)
        };
        let namespace = namespace.to_string();

        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let id = if digits > 0 {
            Some(rest[..digits].parse::<u64>().map_err(|e| {
                RealtimeError::Protocol(format!("invalid ack id: {e}"))
            })?)
        } else {
            None
        };
        let payload = &rest[digits..];
        let data = if payload.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(payload)?)
        };

        match kind {
            '0' => Ok(Self::Connect { namespace, data }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => {
                let Some(Value::Array(mut items)) = data else {
                    return Err(RealtimeError::Protocol("event payload is not an array".into()));
                };
                if items.is_empty() {
                    return Err(RealtimeError::Protocol("event without a name".into()));
                }
                let Value::String(name) = items.remove(0) else {
                    return Err(RealtimeError::Protocol("event name is not a string".into()));
                };
                Ok(Self::Event {
                    namespace,
                    id,
                    name,
                    args: items,
                })
            }
            '3' => {
                let id = id.ok_or_else(|| RealtimeError::Protocol("ack without id".into()))?;
                let args = match data {
                    Some(Value::Array(items)) => items,
                    None => Vec::new(),
                    Some(_) => {
                        return Err(RealtimeError::Protocol("ack payload is not an array".into()));
                    }
                };
                Ok(Self::Ack {
                    namespace,
                    id,
                    args,
                })
            }
            '4' => Ok(Self::ConnectError { namespace, data }),
            other => Err(RealtimeError::Protocol(format!(
                "unknown socket packet type {other:?}"
            ))),
        }
    }

    /// Human readable reason from a connect-error payload.
    pub fn error_message(data: Option<&Value>) -> String {
        match data {
            Some(Value::String(message)) => message.clone(),
            Some(value) => value
                .get("message")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| value.to_string()),
            None => "connection refused".into(),
        }
    }
}
