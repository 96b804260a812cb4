//! Fluent message construction.
//!
//! The builder defers errors: chain as many setters as you like, then
//! [`Builder::build`] returns the first failure (if any) or the finished
//! message.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::message::Message;
use crate::spec::{CompiledPackager, FieldType};

pub struct Builder {
    msg: Message<'static>,
    errors: Vec<Error>,
}

impl Builder {
    pub fn new(packager: Arc<CompiledPackager>) -> Self {
        Builder {
            msg: Message::new(packager),
            errors: Vec::new(),
        }
    }

    pub fn mti(mut self, mti: &str) -> Self {
        if let Err(e) = self.msg.set_mti(mti) {
            self.errors.push(e);
        }
        self
    }

    pub fn field(mut self, field_num: u8, value: &str) -> Self {
        if let Err(e) = self.msg.set_field_owned(
            field_num,
            value.as_bytes().to_vec(),
            FieldType::AlphaNumericSpecial,
        ) {
            self.errors.push(e);
        }
        self
    }

    pub fn field_bytes(mut self, field_num: u8, value: Vec<u8>) -> Self {
        if let Err(e) = self.msg.set_field_owned(field_num, value, FieldType::Binary) {
            self.errors.push(e);
        }
        self
    }

    pub fn field_int(mut self, field_num: u8, value: i64, width: usize) -> Self {
        if let Err(e) = self.msg.set_field_int(field_num, value, width) {
            self.errors.push(e);
        }
        self
    }

    pub fn pan(self, pan: &str) -> Self {
        self.field(2, pan)
    }

    pub fn processing_code(self, code: &str) -> Self {
        self.field(3, code)
    }

    pub fn amount(self, amount: &str) -> Self {
        self.field(4, amount)
    }

    pub fn stan(self, stan: &str) -> Self {
        self.field(11, stan)
    }

    pub fn build(self) -> Result<Message<'static>> {
        match self.errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(self.msg),
        }
    }
}
