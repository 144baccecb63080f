//! Access to external record sources.
//!
//! Scans and keyed lookups see storage only through [`FileAccess`]. The real
//! record, B-tree and bitmap drivers live in the storage layer; [`MemoryFile`]
//! is a sequential and keyed source over tuples held in memory.

use std::collections::HashMap;

use crate::error::{KernelError, Result};
use crate::value::Value;

pub trait FileAccess: Send {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn is_opened(&self) -> bool;
    /// Reads the next tuple into `buffer`, returning false at the end.
    fn get_data(&mut self, buffer: &mut Vec<Value>) -> Result<bool>;
    /// Rewinds sequential reading.
    fn rewind(&mut self) -> Result<()>;
    /// Keyed fetch of the tuple whose first column equals `key`.
    fn get(&mut self, key: &Value, buffer: &mut Vec<Value>) -> Result<bool>;
    fn put(&mut self, buffer: &[Value]) -> Result<()>;
    fn property(&self, name: &str) -> Option<Value>;
    fn set_property(&mut self, name: &str, value: Value);
}

#[derive(Debug, Default)]
pub struct MemoryFile {
    tuples: Vec<Vec<Value>>,
    position: usize,
    opened: bool,
    properties: HashMap<String, Value>,
}

impl MemoryFile {
    pub fn new(tuples: Vec<Vec<Value>>) -> Self {
        Self { tuples, ..Self::default() }
    }
    pub fn tuples(&self) -> &[Vec<Value>] {
        &self.tuples
    }

    fn check_opened(&self) -> Result<()> {
        if self.opened { Ok(()) } else { Err(KernelError::unexpected("file is not opened")) }
    }
}

impl FileAccess for MemoryFile {
    fn open(&mut self) -> Result<()> {
        self.opened = true;
        self.position = 0;
        Ok(())
    }
    fn close(&mut self) -> Result<()> {
        self.opened = false;
        Ok(())
    }
    fn is_opened(&self) -> bool {
        self.opened
    }
    fn get_data(&mut self, buffer: &mut Vec<Value>) -> Result<bool> {
        self.check_opened()?;
        match self.tuples.get(self.position) {
            Some(tuple) => {
                buffer.clone_from(tuple);
                self.position += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }
    fn rewind(&mut self) -> Result<()> {
        self.check_opened()?;
        self.position = 0;
        Ok(())
    }
    fn get(&mut self, key: &Value, buffer: &mut Vec<Value>) -> Result<bool> {
        self.check_opened()?;
        if key.is_null() {
            return Ok(false);
        }
        match self.tuples.iter().find(|tuple| tuple.first() == Some(key)) {
            Some(tuple) => {
                buffer.clone_from(tuple);
                Ok(true)
            }
            None => Ok(false),
        }
    }
    fn put(&mut self, buffer: &[Value]) -> Result<()> {
        self.check_opened()?;
        self.tuples.push(buffer.to_vec());
        Ok(())
    }
    fn property(&self, name: &str) -> Option<Value> {
        match name {
            "count" => Some(Value::Integer(self.tuples.len() as i64)),
            _ => self.properties.get(name).cloned(),
        }
    }
    fn set_property(&mut self, name: &str, value: Value) {
        self.properties.insert(name.to_owned(), value);
    }
}
