use crate::error::YakDbError;
use crate::graph::attributes::{BasicAttributed, BasicAttributes, ExtendedAttributed};
use crate::graph::identifier::check_identifier;

/// A single node of a graph, keyed in the node table by its id
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    pub id: Vec<u8>,
    pub basic_attributes: BasicAttributes,
}

impl Node {
    /// Create a node value without writing it; use
    /// [crate::graph::Graph::create_node] to create and save in one
    /// step
    pub fn new(id: impl Into<Vec<u8>>, basic_attributes: BasicAttributes) -> Result<Self, YakDbError> {
        let id = id.into();
        check_identifier(&id)?;
        Ok(Node {
            id,
            basic_attributes,
        })
    }
}

impl BasicAttributed for Node {
    fn basic_attributes(&self) -> &BasicAttributes {
        &self.basic_attributes
    }

    fn basic_attributes_mut(&mut self) -> &mut BasicAttributes {
        &mut self.basic_attributes
    }
}

impl ExtendedAttributed for Node {
    fn attribute_owner_id(&self) -> Vec<u8> {
        self.id.clone()
    }
}
