mod captures;
mod lines;
mod python;

pub use lines::LineIndex;
pub use python::{Definition, ParseError, PythonParser, is_builtin_name, is_python_path};
