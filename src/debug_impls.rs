//! Small `Debug` wrappers so logs and snapshot tests don't dump raw image bytes.

use std::fmt;

pub struct DebugBytesPrefix<'a>(pub &'a [u8]);

impl fmt::Debug for DebugBytesPrefix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            [x, y, z, _, ..] => {
                let len = self.0.len();
                f.write_fmt(format_args!("{{ len: {len}, data: [{x}, {y}, {z}, ..] }}"))
            }
            three_or_less => f.write_fmt(format_args!("{three_or_less:?}")),
        }
    }
}
