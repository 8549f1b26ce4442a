//! Request and response messages.
//!
//! A payload starts with a boolean marking responses. Requests continue
//! with a correlation id, a container selector, an opcode and the opcode's
//! arguments. Responses continue with the correlation id, a status byte and
//! either the reply or a [`RemoteError`].

use crate::batch::UpdateBatch;
use crate::error::{ProtocolError, ProtocolResult};
use crate::remote_error::RemoteError;
use bytes::Bytes;
use chrono::NaiveDateTime;
use itemdb_codec::DataStream;
use itemdb_core::{ConnectionId, ContainerId, ItemId, Record, Schema};
use std::sync::Arc;

/// Selector addressing the database rather than a container.
pub const DATABASE_SELECTOR: u8 = 0xFF;

/// Response status for success.
pub const STATUS_OK: u8 = 0;

/// Response status for failure.
pub const STATUS_ERROR: u8 = 1;

/// Operation requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Verify the database password for this session.
    Open = 1,
    /// End the session.
    Close = 2,
    /// Authenticate a user and allocate a connection id.
    AddConnection = 3,
    /// Release a connection id.
    CloseConnection = 4,
    /// Pull items changed since a watermark.
    Update = 16,
    /// Add a record, letting the server assign the id.
    Add = 17,
    /// Insert a record under its own id.
    Insert = 18,
    /// Overwrite an existing record.
    Set = 19,
    /// Remove a record by id.
    Remove = 20,
}

impl Opcode {
    /// Decodes an opcode valid for `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownOpcode`] for undefined values and for
    /// database opcodes sent to a container (or the reverse).
    pub fn from_u8(selector: u8, opcode: u8) -> ProtocolResult<Self> {
        let decoded = match opcode {
            1 => Self::Open,
            2 => Self::Close,
            3 => Self::AddConnection,
            4 => Self::CloseConnection,
            16 => Self::Update,
            17 => Self::Add,
            18 => Self::Insert,
            19 => Self::Set,
            20 => Self::Remove,
            _ => return Err(ProtocolError::UnknownOpcode { selector, opcode }),
        };
        if decoded.is_database_level() != (selector == DATABASE_SELECTOR) {
            return Err(ProtocolError::UnknownOpcode { selector, opcode });
        }
        Ok(decoded)
    }

    /// Returns true for opcodes addressed to [`DATABASE_SELECTOR`].
    #[must_use]
    pub fn is_database_level(self) -> bool {
        (self as u8) < 16
    }
}

/// A decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// Open the remote database.
    Open {
        /// Database password.
        password: String,
    },
    /// Close the remote database.
    Close,
    /// Log a user in.
    AddConnection {
        /// User name.
        user: String,
        /// User password.
        password: String,
    },
    /// Log a connection out.
    CloseConnection {
        /// Connection to release.
        connection: ConnectionId,
    },
    /// Pull changes.
    Update {
        /// Addressed container.
        container: ContainerId,
        /// Only items updated after the cursor `(watermark, after)` are
        /// returned.
        watermark: NaiveDateTime,
        /// Items stamped exactly `watermark` must have a greater id.
        /// [`UNASSIGNED_ID`](itemdb_core::UNASSIGNED_ID) starts at the
        /// beginning of that second.
        after: ItemId,
    },
    /// Add with a server-assigned id.
    Add {
        /// Addressed container.
        container: ContainerId,
        /// Acting connection.
        connection: ConnectionId,
        /// Record to add.
        record: Record,
    },
    /// Insert under the record's id.
    Insert {
        /// Addressed container.
        container: ContainerId,
        /// Acting connection.
        connection: ConnectionId,
        /// Record to insert.
        record: Record,
    },
    /// Overwrite by the record's id.
    Set {
        /// Addressed container.
        container: ContainerId,
        /// Acting connection.
        connection: ConnectionId,
        /// Replacement record.
        record: Record,
    },
    /// Remove by id.
    Remove {
        /// Addressed container.
        container: ContainerId,
        /// Acting connection.
        connection: ConnectionId,
        /// Item to remove.
        id: ItemId,
    },
}

impl Call {
    /// The call's opcode.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Open { .. } => Opcode::Open,
            Self::Close => Opcode::Close,
            Self::AddConnection { .. } => Opcode::AddConnection,
            Self::CloseConnection { .. } => Opcode::CloseConnection,
            Self::Update { .. } => Opcode::Update,
            Self::Add { .. } => Opcode::Add,
            Self::Insert { .. } => Opcode::Insert,
            Self::Set { .. } => Opcode::Set,
            Self::Remove { .. } => Opcode::Remove,
        }
    }

    /// The addressed container, `None` for database calls.
    #[must_use]
    pub fn container(&self) -> Option<ContainerId> {
        match self {
            Self::Update { container, .. }
            | Self::Add { container, .. }
            | Self::Insert { container, .. }
            | Self::Set { container, .. }
            | Self::Remove { container, .. } => Some(*container),
            _ => None,
        }
    }

    /// The selector byte.
    #[must_use]
    pub fn selector(&self) -> u8 {
        self.container()
            .map_or(DATABASE_SELECTOR, ContainerId::as_u8)
    }

    fn encode_args(&self, stream: &mut DataStream) -> ProtocolResult<()> {
        match self {
            Self::Open { password } => stream.write_string(password)?,
            Self::Close => {}
            Self::AddConnection { user, password } => {
                stream.write_string(user)?;
                stream.write_string(password)?;
            }
            Self::CloseConnection { connection } => stream.write_i32(*connection),
            Self::Update { watermark, after, .. } => {
                stream.write_date_time(watermark)?;
                stream.write_i32(*after);
            }
            Self::Add {
                connection, record, ..
            }
            | Self::Insert {
                connection, record, ..
            }
            | Self::Set {
                connection, record, ..
            } => {
                stream.write_i32(*connection);
                record.encode(stream)?;
            }
            Self::Remove { connection, id, .. } => {
                stream.write_i32(*connection);
                stream.write_i32(*id);
            }
        }
        Ok(())
    }
}

/// Routing fields of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Id echoed by the response.
    pub correlation: u16,
    /// Container id or [`DATABASE_SELECTOR`].
    pub selector: u8,
    /// Raw opcode byte.
    pub opcode: u8,
}

/// A request ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Id echoed by the response.
    pub correlation: u16,
    /// Requested operation.
    pub call: Call,
}

impl Request {
    /// Creates a request.
    #[must_use]
    pub fn new(correlation: u16, call: Call) -> Self {
        Self { correlation, call }
    }

    /// Encodes the unframed payload.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut stream = DataStream::new();
        stream.write_bool(false);
        stream.write_u16(self.correlation);
        stream.write_u8(self.call.selector());
        stream.write_u8(self.call.opcode() as u8);
        self.call.encode_args(&mut stream)?;
        Ok(stream.as_slice().to_vec())
    }

    /// Decodes the arguments of a request whose header was already read.
    ///
    /// `schema_of` resolves a container selector to its record type.
    pub fn decode<F>(header: RequestHeader, args: &[u8], schema_of: F) -> ProtocolResult<Self>
    where
        F: Fn(ContainerId) -> Option<Arc<Schema>>,
    {
        let opcode = Opcode::from_u8(header.selector, header.opcode)?;
        let container = ContainerId::new(header.selector);
        let schema = || schema_of(container).ok_or(ProtocolError::UnknownContainer(header.selector));
        let mut stream = DataStream::from_slice(args);

        let call = match opcode {
            Opcode::Open => Call::Open {
                password: stream.read_string()?,
            },
            Opcode::Close => Call::Close,
            Opcode::AddConnection => Call::AddConnection {
                user: stream.read_string()?,
                password: stream.read_string()?,
            },
            Opcode::CloseConnection => Call::CloseConnection {
                connection: stream.read_i32()?,
            },
            Opcode::Update => {
                schema()?;
                Call::Update {
                    container,
                    watermark: stream.read_date_time()?,
                    after: stream.read_i32()?,
                }
            }
            Opcode::Add | Opcode::Insert | Opcode::Set => {
                let schema = schema()?;
                let connection = stream.read_i32()?;
                let record = Record::decode(&schema, &mut stream)?;
                match opcode {
                    Opcode::Add => Call::Add {
                        container,
                        connection,
                        record,
                    },
                    Opcode::Insert => Call::Insert {
                        container,
                        connection,
                        record,
                    },
                    _ => Call::Set {
                        container,
                        connection,
                        record,
                    },
                }
            }
            Opcode::Remove => {
                schema()?;
                Call::Remove {
                    container,
                    connection: stream.read_i32()?,
                    id: stream.read_i32()?,
                }
            }
        };
        ensure_consumed(&stream)?;
        Ok(Self::new(header.correlation, call))
    }
}

/// Successful result of a call.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// No result value.
    Done,
    /// Allocated connection id.
    Connection(ConnectionId),
    /// Server-assigned item id.
    Added(ItemId),
    /// Pulled changes.
    Batch(UpdateBatch),
}

impl Reply {
    fn encode(&self, stream: &mut DataStream) -> ProtocolResult<()> {
        match self {
            Self::Done => {}
            Self::Connection(id) | Self::Added(id) => stream.write_i32(*id),
            Self::Batch(batch) => batch.encode(stream)?,
        }
        Ok(())
    }

    /// Decodes the reply to a call with `opcode`. Update replies need the
    /// container's record type.
    pub fn decode(
        opcode: Opcode,
        schema: Option<&Arc<Schema>>,
        body: &[u8],
    ) -> ProtocolResult<Self> {
        let mut stream = DataStream::from_slice(body);
        let reply = match opcode {
            Opcode::AddConnection => Self::Connection(stream.read_i32()?),
            Opcode::Add => Self::Added(stream.read_i32()?),
            Opcode::Update => {
                let schema = schema.ok_or(ProtocolError::MissingSchema)?;
                Self::Batch(UpdateBatch::decode(schema, &mut stream)?)
            }
            _ => Self::Done,
        };
        ensure_consumed(&stream)?;
        Ok(reply)
    }
}

/// A response ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Correlation id of the request.
    pub correlation: u16,
    /// Reply or error.
    pub result: Result<Reply, RemoteError>,
}

impl Response {
    /// Encodes the unframed payload.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut stream = DataStream::new();
        stream.write_bool(true);
        stream.write_u16(self.correlation);
        match &self.result {
            Ok(reply) => {
                stream.write_u8(STATUS_OK);
                reply.encode(&mut stream)?;
            }
            Err(err) => {
                stream.write_u8(STATUS_ERROR);
                err.encode(&mut stream)?;
            }
        }
        Ok(stream.as_slice().to_vec())
    }
}

/// A received response whose body is decoded once the caller knows which
/// call it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// Correlation id of the request.
    pub correlation: u16,
    /// Undecoded reply body, or the remote error.
    pub result: Result<Bytes, RemoteError>,
}

/// A received payload split into its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Request header plus raw arguments.
    Request {
        /// Routing fields.
        header: RequestHeader,
        /// Undecoded arguments.
        args: Bytes,
    },
    /// Response with undecoded body.
    Response(RawResponse),
}

impl Message {
    /// Splits a payload into header and body.
    pub fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        let mut stream = DataStream::from_slice(payload);
        let is_response = stream.read_bool()?;
        let correlation = stream.read_u16()?;
        if !is_response {
            let selector = stream.read_u8()?;
            let opcode = stream.read_u8()?;
            return Ok(Self::Request {
                header: RequestHeader {
                    correlation,
                    selector,
                    opcode,
                },
                args: stream.take_remaining(),
            });
        }

        let result = match stream.read_u8()? {
            STATUS_OK => Ok(stream.take_remaining()),
            STATUS_ERROR => {
                let err = RemoteError::decode(&mut stream)?;
                ensure_consumed(&stream)?;
                Err(err)
            }
            other => return Err(ProtocolError::UnknownStatus(other)),
        };
        Ok(Self::Response(RawResponse {
            correlation,
            result,
        }))
    }
}

fn ensure_consumed(stream: &DataStream) -> ProtocolResult<()> {
    if stream.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::TrailingBytes(stream.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote_error::ErrorCode;
    use itemdb_core::{epoch, Attribute, MetaItem};

    fn participant() -> Arc<Schema> {
        Schema::builder("Participant")
            .attribute(Attribute::string("name", "Participant name"))
            .build()
            .unwrap()
    }

    fn decode_request(bytes: &[u8], schema: &Arc<Schema>) -> Request {
        match Message::decode(bytes).unwrap() {
            Message::Request { header, args } => {
                Request::decode(header, &args, |id| (id.as_u8() == 0).then(|| Arc::clone(schema)))
                    .unwrap()
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn open_request_layout() {
        let bytes = Request::new(7, Call::Open { password: "pw".into() })
            .encode()
            .unwrap();
        assert_eq!(bytes, [0, 0, 7, 0xff, 1, 0, 2, b'p', b'w']);
    }

    #[test]
    fn container_calls_survive_the_wire() {
        let schema = participant();
        let record = Record::build(&schema, [("name", "Peter")]).unwrap().with_id(4);
        let calls = [
            Call::Close,
            Call::AddConnection {
                user: "admin".into(),
                password: "secret".into(),
            },
            Call::CloseConnection { connection: 3 },
            Call::Update {
                container: ContainerId::new(0),
                watermark: epoch(),
                after: 41,
            },
            Call::Insert {
                container: ContainerId::new(0),
                connection: 1,
                record: record.clone(),
            },
            Call::Set {
                container: ContainerId::new(0),
                connection: 1,
                record,
            },
            Call::Remove {
                container: ContainerId::new(0),
                connection: 1,
                id: 4,
            },
        ];
        for (n, call) in calls.into_iter().enumerate() {
            let request = Request::new(n as u16, call);
            let decoded = decode_request(&request.encode().unwrap(), &schema);
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn unknown_container_rejected() {
        let schema = participant();
        let bytes = Request::new(
            1,
            Call::Add {
                container: ContainerId::new(5),
                connection: 0,
                record: Record::new(&schema).unwrap(),
            },
        )
        .encode()
        .unwrap();
        let Message::Request { header, args } = Message::decode(&bytes).unwrap() else {
            panic!("expected request");
        };
        assert!(matches!(
            Request::decode(header, &args, |_| None),
            Err(ProtocolError::UnknownContainer(5))
        ));
    }

    #[test]
    fn opcode_must_match_selector() {
        assert!(Opcode::from_u8(DATABASE_SELECTOR, 17).is_err());
        assert!(Opcode::from_u8(0, 1).is_err());
        assert!(Opcode::from_u8(0, 99).is_err());
        assert_eq!(Opcode::from_u8(2, 20).unwrap(), Opcode::Remove);
    }

    #[test]
    fn trailing_arguments_rejected() {
        let mut bytes = Request::new(1, Call::Close).encode().unwrap();
        bytes.push(0);
        let Message::Request { header, args } = Message::decode(&bytes).unwrap() else {
            panic!("expected request");
        };
        assert!(matches!(
            Request::decode(header, &args, |_| None),
            Err(ProtocolError::TrailingBytes(1))
        ));
    }

    #[test]
    fn ok_response_decodes_by_opcode() {
        let bytes = Response {
            correlation: 9,
            result: Ok(Reply::Added(12)),
        }
        .encode()
        .unwrap();
        assert_eq!(bytes, [1, 0, 9, 0, 0, 0, 0, 12]);

        let Message::Response(raw) = Message::decode(&bytes).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(raw.correlation, 9);
        let body = raw.result.unwrap();
        assert_eq!(Reply::decode(Opcode::Add, None, &body).unwrap(), Reply::Added(12));
    }

    #[test]
    fn batch_reply_needs_schema() {
        let schema = participant();
        let batch = UpdateBatch {
            entries: vec![crate::batch::BatchEntry {
                meta: MetaItem::new(0, epoch()),
                record: Some(Record::new(&schema).unwrap().with_id(0)),
            }],
            server_time: epoch(),
            more: false,
        };
        let bytes = Response {
            correlation: 1,
            result: Ok(Reply::Batch(batch.clone())),
        }
        .encode()
        .unwrap();
        let Message::Response(raw) = Message::decode(&bytes).unwrap() else {
            panic!("expected response");
        };
        let body = raw.result.unwrap();
        assert!(Reply::decode(Opcode::Update, None, &body).is_err());
        assert_eq!(
            Reply::decode(Opcode::Update, Some(&schema), &body).unwrap(),
            Reply::Batch(batch)
        );
    }

    #[test]
    fn error_response_carries_remote_error() {
        let err = RemoteError {
            code: ErrorCode::ItemNotFound,
            detail: "gone".into(),
            item_id: 3,
        };
        let bytes = Response {
            correlation: 2,
            result: Err(err.clone()),
        }
        .encode()
        .unwrap();
        match Message::decode(&bytes).unwrap() {
            Message::Response(raw) => assert_eq!(raw.result, Err(err)),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn bad_status_rejected() {
        assert!(matches!(
            Message::decode(&[1, 0, 0, 7]),
            Err(ProtocolError::UnknownStatus(7))
        ));
    }
}
