//! Protocol surfaces generated from the endpoint table: REST route table,
//! request/response schemas, the OpenAPI document and the MCP tool catalog.
//! Everything here is a pure projection and is rebuilt per revision.

pub mod openapi;
pub mod routes;
pub mod schema;
pub mod tools;
