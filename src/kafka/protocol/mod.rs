// Kafka wire protocol
//
// [4 bytes: size (big-endian i32)] [RequestHeader] [RequestBody]
//
// kafka-protocol provides the generated message structs; this module does
// the routing by API key and the record batch conversion.
//
// - decoding: header and body decode into `KafkaRequest`
// - encoding: response header and body encode
// - recordbatch: RecordBatch / MessageSet parse and Fetch-side encode

mod decoding;
mod encoding;
mod recordbatch;

pub use decoding::{decode_body, decode_header, parse_request};
pub use encoding::encode_response;
pub use recordbatch::{encode_records, parse_record_batch, record_format_for_fetch};
