// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A pure, POSIX-only path type: joining and component accessors with no
//! filesystem access.

use crate::builtins::utils::{ensure_args_count, no_kwargs};
use crate::builtins::{BoundMethod, Kwargs, MethodFcn};
use crate::exceptions::{attribute_error, type_error, value_error, Result};
use crate::interpreter::Interpreter;
use crate::value::Value;
use crate::Rc;


/// A normalized pure path: `//` and `.` segments are collapsed at
/// construction, `..` segments are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurePath {
    absolute: bool,
    segments: Vec<String>,
}

impl PurePath {
    pub fn new(text: &str) -> PurePath {
        let absolute = text.starts_with('/');
        let segments = text
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .map(str::to_string)
            .collect();
        PurePath { absolute, segments }
    }

    pub fn join(&self, other: &str) -> PurePath {
        if other.starts_with('/') {
            return PurePath::new(other);
        }
        let mut out = self.clone();
        out.segments.extend(
            other
                .split('/')
                .filter(|s| !s.is_empty() && *s != ".")
                .map(str::to_string),
        );
        out
    }

    pub fn as_posix(&self) -> String {
        if self.segments.is_empty() {
            return if self.absolute { "/" } else { "." }.to_string();
        }
        let joined = self.segments.join("/");
        if self.absolute {
            format!("/{joined}")
        } else {
            joined
        }
    }

    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    pub fn parent(&self) -> PurePath {
        let mut out = self.clone();
        if !out.segments.is_empty() {
            out.segments.pop();
        }
        out
    }

    /// Final component without its last suffix.
    pub fn stem(&self) -> String {
        let name = self.name();
        match split_suffix(name) {
            Some((stem, _)) => stem.to_string(),
            None => name.to_string(),
        }
    }

    pub fn suffix(&self) -> String {
        match split_suffix(self.name()) {
            Some((_, suffix)) => format!(".{suffix}"),
            None => String::new(),
        }
    }

    pub fn suffixes(&self) -> Vec<String> {
        let name = self.name().trim_start_matches('.');
        let mut parts: Vec<String> = name.split('.').map(str::to_string).collect();
        parts.remove(0);
        parts.into_iter().map(|s| format!(".{s}")).collect()
    }

    pub fn parts(&self) -> Vec<String> {
        let mut out = vec![];
        if self.absolute {
            out.push("/".to_string());
        }
        out.extend(self.segments.iter().cloned());
        out
    }

    pub const fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn with_name(&self, name: &str) -> Result<PurePath> {
        if self.segments.is_empty() {
            return Err(value_error(format!(
                "PurePosixPath('{}') has an empty name",
                self.as_posix()
            )));
        }
        if name.is_empty() || name.contains('/') {
            return Err(value_error(format!("Invalid name {name:?}")));
        }
        let mut out = self.clone();
        out.segments.pop();
        out.segments.push(name.to_string());
        Ok(out)
    }

    pub fn with_suffix(&self, suffix: &str) -> Result<PurePath> {
        if !suffix.is_empty() && (!suffix.starts_with('.') || suffix == "." || suffix.contains('/'))
        {
            return Err(value_error(format!("Invalid suffix {suffix:?}")));
        }
        let stem = self.stem();
        if stem.is_empty() {
            return Err(value_error(format!(
                "PurePosixPath('{}') has an empty name",
                self.as_posix()
            )));
        }
        self.with_name(&format!("{stem}{suffix}"))
    }
}

/// `name.ext` → `(name, ext)`; hidden files and bare names have none.
fn split_suffix(name: &str) -> Option<(&str, &str)> {
    let trimmed = name.trim_start_matches('.');
    let dot = trimmed.rfind('.')?;
    let offset = name.len() - trimmed.len();
    let at = offset + dot;
    if at == 0 || at + 1 == name.len() {
        return None;
    }
    Some((&name[..at], &name[at + 1..]))
}

fn path_text(fcn: &str, v: &Value) -> Result<String> {
    match v {
        Value::Str(s) => Ok(s.to_string()),
        Value::Path(p) => Ok(p.as_posix()),
        other => Err(type_error(format!(
            "argument should be a str or an os.PathLike object where __fspath__ returns a str, \
             not '{}' ({fcn})",
            other.type_name()
        ))),
    }
}

pub(crate) fn construct(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    no_kwargs("Path", kwargs)?;
    vm.tracker.allocate()?;
    let mut path = PurePath::new("");
    for arg in args {
        let text = path_text("Path", arg)?;
        path = path.join(&text);
    }
    Ok(Value::Path(Rc::new(path)))
}

fn recv_path(recv: &Value) -> &PurePath {
    match recv {
        Value::Path(p) => p,
        other => unreachable!("path method on {other:?}"),
    }
}

pub(crate) fn lookup_attr(vm: &mut Interpreter, obj: &Value, name: &str) -> Result<Value> {
    let p = recv_path(obj);
    // Data attributes first, then bound methods.
    match name {
        "name" => return Ok(Value::from(p.name())),
        "parent" => {
            vm.tracker.allocate()?;
            return Ok(Value::Path(Rc::new(p.parent())));
        }
        "stem" => return Ok(Value::from(p.stem())),
        "suffix" => return Ok(Value::from(p.suffix())),
        "suffixes" => {
            vm.tracker.allocate()?;
            return Ok(Value::new_list(
                p.suffixes().into_iter().map(Value::from).collect(),
            ));
        }
        "parts" => {
            vm.tracker.allocate()?;
            return Ok(Value::new_tuple(
                p.parts().into_iter().map(Value::from).collect(),
            ));
        }
        _ => {}
    }
    let (name, fcn): (&'static str, MethodFcn) = match name {
        "as_posix" => ("as_posix", as_posix),
        "is_absolute" => ("is_absolute", is_absolute),
        "joinpath" => ("joinpath", joinpath),
        "with_name" => ("with_name", with_name),
        "with_suffix" => ("with_suffix", with_suffix),
        _ => return Err(attribute_error("PosixPath", name)),
    };
    Ok(Value::BoundMethod(Rc::new(BoundMethod {
        name,
        recv: obj.clone(),
        fcn,
    })))
}

fn as_posix(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("as_posix", args, 0)?;
    no_kwargs("as_posix", kwargs)?;
    Ok(Value::from(recv_path(recv).as_posix()))
}

fn is_absolute(
    _vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("is_absolute", args, 0)?;
    no_kwargs("is_absolute", kwargs)?;
    Ok(Value::Bool(recv_path(recv).is_absolute()))
}

fn joinpath(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    no_kwargs("joinpath", kwargs)?;
    vm.tracker.allocate()?;
    let mut path = recv_path(recv).clone();
    for arg in args {
        path = path.join(&path_text("joinpath", arg)?);
    }
    Ok(Value::Path(Rc::new(path)))
}

fn with_name(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("with_name", args, 1)?;
    no_kwargs("with_name", kwargs)?;
    let name = match &args[0] {
        Value::Str(s) => s.to_string(),
        other => {
            return Err(type_error(format!(
                "with_name() argument must be str, not {}",
                other.type_name()
            )))
        }
    };
    vm.tracker.allocate()?;
    Ok(Value::Path(Rc::new(recv_path(recv).with_name(&name)?)))
}

fn with_suffix(
    vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("with_suffix", args, 1)?;
    no_kwargs("with_suffix", kwargs)?;
    let suffix = match &args[0] {
        Value::Str(s) => s.to_string(),
        other => {
            return Err(type_error(format!(
                "with_suffix() argument must be str, not {}",
                other.type_name()
            )))
        }
    };
    vm.tracker.allocate()?;
    Ok(Value::Path(Rc::new(recv_path(recv).with_suffix(&suffix)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joining_and_accessors() {
        let p = PurePath::new("/usr/lib").join("python3.11/os.py");
        assert_eq!(p.as_posix(), "/usr/lib/python3.11/os.py");
        assert_eq!(p.name(), "os.py");
        assert_eq!(p.stem(), "os");
        assert_eq!(p.suffix(), ".py");
        assert_eq!(p.parent().as_posix(), "/usr/lib/python3.11");
        assert!(p.is_absolute());
        assert_eq!(
            p.parts(),
            vec!["/", "usr", "lib", "python3.11", "os.py"]
        );
    }

    #[test]
    fn absolute_join_resets() {
        let p = PurePath::new("a/b").join("/etc");
        assert_eq!(p.as_posix(), "/etc");
    }

    #[test]
    fn suffixes_chain() {
        let p = PurePath::new("archive.tar.gz");
        assert_eq!(p.suffixes(), vec![".tar", ".gz"]);
        assert_eq!(p.stem(), "archive.tar");
        assert_eq!(p.suffix(), ".gz");
    }

    #[test]
    fn hidden_files_have_no_suffix() {
        let p = PurePath::new(".bashrc");
        assert_eq!(p.suffix(), "");
        assert_eq!(p.stem(), ".bashrc");
    }

    #[test]
    fn with_name_and_suffix() {
        let p = PurePath::new("/a/b.txt");
        assert_eq!(p.with_name("c.md").unwrap().as_posix(), "/a/c.md");
        assert_eq!(p.with_suffix(".md").unwrap().as_posix(), "/a/b.md");
        assert_eq!(p.with_suffix("").unwrap().as_posix(), "/a/b");
        assert!(PurePath::new("/").with_name("x").is_err());
        assert!(p.with_suffix("md").is_err());
    }

    #[test]
    fn empty_and_dot() {
        assert_eq!(PurePath::new("").as_posix(), ".");
        assert_eq!(PurePath::new("/").as_posix(), "/");
        assert_eq!(PurePath::new("a/./b//c").as_posix(), "a/b/c");
        assert_eq!(PurePath::new("a/../b").as_posix(), "a/../b");
    }
}
