//! GraphQL document classification.
//!
//! Only the first operation definition of a document matters: its kind and
//! optional name are what handlers match on.

use crate::error::GraphQLError;
use graphql_parser::query::{parse_query, Definition, OperationDefinition};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a GraphQL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Query => write!(f, "query"),
            OperationType::Mutation => write!(f, "mutation"),
            OperationType::Subscription => write!(f, "subscription"),
        }
    }
}

/// Classification of a GraphQL document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedGraphQLQuery {
    /// `None` when the document has no operation definition at all
    pub operation_type: Option<OperationType>,
    /// `None` for anonymous operations
    pub operation_name: Option<String>,
}

/// Parse query text and classify its first operation.
pub fn parse_document(query: &str) -> Result<ParsedGraphQLQuery, GraphQLError> {
    let document =
        parse_query::<&str>(query).map_err(|e| GraphQLError::Syntax(e.to_string()))?;

    let first = document.definitions.iter().find_map(|definition| match definition {
        Definition::Operation(operation) => Some(operation),
        Definition::Fragment(_) => None,
    });

    let (operation_type, operation_name) = match first {
        Some(OperationDefinition::SelectionSet(_)) => (Some(OperationType::Query), None),
        Some(OperationDefinition::Query(op)) => (Some(OperationType::Query), op.name),
        Some(OperationDefinition::Mutation(op)) => (Some(OperationType::Mutation), op.name),
        Some(OperationDefinition::Subscription(op)) => {
            (Some(OperationType::Subscription), op.name)
        }
        None => (None, None),
    };

    Ok(ParsedGraphQLQuery {
        operation_type,
        operation_name: operation_name.map(str::to_owned),
    })
}
