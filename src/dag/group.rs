// src/dag/group.rs

//! Flat task lists persisted as JSON lines, one task per line.

use std::io::{BufRead, Write};

use crate::dag::task::Task;
use crate::errors::Result;

#[derive(Debug, Clone, Default)]
pub struct TaskGroup {
    tasks: Vec<Task>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn append(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn store<W: Write>(&self, mut writer: W) -> Result<()> {
        for task in &self.tasks {
            serde_json::to_writer(&mut writer, task)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Append every task found in `reader`. Blank lines are skipped.
    pub fn load<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            self.tasks.push(serde_json::from_str(&line)?);
        }
        Ok(())
    }
}

impl IntoIterator for TaskGroup {
    type Item = Task;
    type IntoIter = std::vec::IntoIter<Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.into_iter()
    }
}
