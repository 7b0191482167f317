//! Per-invocation write buffer
//!
//! A constructor's outputs are staged here and only reach the owning scope
//! once the constructor has returned successfully. A failed or rejected
//! invocation leaves the scope untouched.

use crate::error::DigError;
use crate::key::Key;
use crate::plan::{Output, ResultPlan, ResultSlot};
use crate::types::{Location, Value};

/// Destination of a committed invocation
pub(crate) trait ContainerWriter {
    fn set_value(&self, key: Key, value: Value);
    fn submit_group_values(&self, key: Key, values: Vec<Value>);
}

#[derive(Default)]
pub(crate) struct StagingWriter {
    values: Vec<(Key, Value)>,
    groups: Vec<(Key, Vec<Value>)>,
}

impl StagingWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Route constructor outputs through the result plan, including alias
    /// duplicates and group fan-out.
    pub(crate) fn stage(
        &mut self,
        plan: &ResultPlan,
        outputs: Vec<Output>,
        location: &Location,
    ) -> Result<(), DigError> {
        if outputs.len() != plan.slots().len() {
            return Err(DigError::invalid(
                location,
                format!(
                    "returned {} values but declares {} results",
                    outputs.len(),
                    plan.slots().len()
                ),
            ));
        }

        for (slot, output) in plan.slots().iter().zip(outputs) {
            match (output, slot.flatten) {
                (Output::Value(value), false) => self.stage_value(slot, value, location)?,
                (Output::Many(values), true) => self.submit_group(slot.key.clone(), values),
                (Output::Value(_), true) => {
                    return Err(DigError::invalid(
                        location,
                        format!("expected a list of values for {}", slot.key),
                    ))
                }
                (Output::Many(_), false) => {
                    return Err(DigError::invalid(
                        location,
                        format!("expected a single value for {}", slot.key),
                    ))
                }
            }
        }
        Ok(())
    }

    fn stage_value(&mut self, slot: &ResultSlot, value: Value, location: &Location) -> Result<(), DigError> {
        if slot.key.is_group() {
            self.submit_group(slot.key.clone(), vec![value]);
            return Ok(());
        }

        for alias in &slot.aliases {
            let converted = (alias.convert)(&value).ok_or_else(|| {
                DigError::invalid(location, format!("cannot convert {} into {}", slot.key, alias.key))
            })?;
            self.values.push((alias.key.clone(), converted));
        }
        self.values.push((slot.key.clone(), value));
        Ok(())
    }

    fn submit_group(&mut self, key: Key, values: Vec<Value>) {
        self.groups.push((key, values));
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.values.len() + self.groups.iter().map(|(_, values)| values.len()).sum::<usize>()
    }

    pub(crate) fn commit(self, target: &impl ContainerWriter) {
        for (key, value) in self.values {
            target.set_value(key, value);
        }
        for (key, values) in self.groups {
            target.submit_group_values(key, values);
        }
    }
}
