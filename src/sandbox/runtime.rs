//! @ai:module:intent Candidate language runtimes: how a validation function becomes a child process
//! @ai:module:layer infrastructure
//! @ai:module:public_api CandidateRuntime, PythonRuntime, ShellRuntime, Invocation, PreparedCommand, runtime_for
//! @ai:module:stateless true

use crate::config::{RuntimeKind, SandboxConfig};
use crate::context::{ExecutionContext, ResolvedValue};
use crate::error::SandboxError;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// @ai:intent Everything a runtime needs to run one attempt
pub struct Invocation<'a> {
    pub source: &'a str,
    pub context: &'a ExecutionContext,
    pub workspace: &'a Path,
}

/// @ai:intent Program, arguments, extra environment and stdin for the child
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
}

/// @ai:intent Trait for languages candidate implementations are written in
pub trait CandidateRuntime: Send + Sync {
    fn kind(&self) -> RuntimeKind;

    /// @ai:intent Interpreter executable
    fn program(&self) -> &str;

    /// @ai:intent Extension of candidate module files
    fn module_extension(&self) -> &'static str;

    /// @ai:intent File marking a directory as a module, if the language has packages
    fn package_marker(&self) -> Option<&'static str>;

    /// @ai:intent Top-level module names a validation function imports
    fn imported_modules(&self, source: &str) -> BTreeSet<String>;

    /// @ai:intent Write harness files into `scratch` and describe the child process
    fn prepare(
        &self,
        scratch: &Path,
        invocation: &Invocation<'_>,
    ) -> Result<PreparedCommand, SandboxError>;

    /// @ai:intent Arguments that make the interpreter print its version
    fn version_args(&self) -> Vec<&'static str>;
}

/// @ai:intent Pick the runtime configured for the engine
/// @ai:effects pure
pub fn runtime_for(config: &SandboxConfig) -> Arc<dyn CandidateRuntime> {
    match config.runtime {
        RuntimeKind::Python => Arc::new(PythonRuntime::new(config.interpreter.clone())),
        RuntimeKind::Shell => Arc::new(ShellRuntime::new(config.interpreter.clone())),
    }
}

/// @ai:intent Runs validation functions with `python3` and an embedded harness
pub struct PythonRuntime {
    program: String,
    from_regex: Regex,
    import_regex: Regex,
    def_regex: Regex,
}

impl PythonRuntime {
    pub fn new(interpreter: Option<String>) -> Self {
        Self {
            program: interpreter.unwrap_or_else(|| "python3".to_string()),
            from_regex: Regex::new(r"(?m)^\s*from\s+([A-Za-z_]\w*)").unwrap(),
            import_regex: Regex::new(r"(?m)^\s*import\s+([^\n#;]+)").unwrap(),
            def_regex: Regex::new(r"(?m)^(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").unwrap(),
        }
    }

    /// @ai:intent Choose the function the harness calls after executing the body
    /// @ai:effects pure
    pub fn entry_point(&self, source: &str) -> EntryPoint {
        let mut defined: Vec<&str> = Vec::new();
        for cap in self.def_regex.captures_iter(source) {
            let name = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
            // A redefinition moves the name to its last position.
            defined.retain(|d| *d != name);
            defined.push(name);
        }

        let tests: Vec<&str> = defined
            .iter()
            .copied()
            .filter(|name| *name == "test" || name.starts_with("test_"))
            .collect();

        match (tests.as_slice(), defined.last()) {
            ([only], _) => EntryPoint::Function(only.to_string()),
            ([], Some(last)) => EntryPoint::Function(last.to_string()),
            ([], None) => EntryPoint::Script,
            (many, _) => EntryPoint::Ambiguous(many.iter().map(|n| n.to_string()).collect()),
        }
    }
}

/// @ai:intent What the Python harness runs once the validation body is loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    /// No function defined; executing the body is the test
    Script,
    Function(String),
    /// Several `test_*` functions and no way to tell which one is the test
    Ambiguous(Vec<String>),
}

impl EntryPoint {
    /// @ai:effects pure
    fn payload(&self) -> (Option<&str>, Option<String>) {
        match self {
            EntryPoint::Script => (None, None),
            EntryPoint::Function(name) => (Some(name.as_str()), None),
            EntryPoint::Ambiguous(names) => (
                None,
                Some(format!(
                    "validation body defines several test functions ({}); expected exactly one",
                    names.join(", ")
                )),
            ),
        }
    }
}

impl CandidateRuntime for PythonRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Python
    }

    fn program(&self) -> &str {
        &self.program
    }

    fn module_extension(&self) -> &'static str {
        "py"
    }

    fn package_marker(&self) -> Option<&'static str> {
        Some("__init__.py")
    }

    fn imported_modules(&self, source: &str) -> BTreeSet<String> {
        let mut modules = BTreeSet::new();

        for cap in self.from_regex.captures_iter(source) {
            modules.insert(cap[1].to_string());
        }

        for cap in self.import_regex.captures_iter(source) {
            for item in cap[1].split(',') {
                let name = item.split_whitespace().next().unwrap_or_default();
                if let Some(top) = name.split('.').next().filter(|t| !t.is_empty()) {
                    modules.insert(top.to_string());
                }
            }
        }

        modules
    }

    fn prepare(
        &self,
        scratch: &Path,
        invocation: &Invocation<'_>,
    ) -> Result<PreparedCommand, SandboxError> {
        let harness = scratch.join("zerg_harness.py");
        std::fs::write(&harness, PYTHON_HARNESS)?;

        let entry_point = self.entry_point(invocation.source);
        let (entry, entry_error) = entry_point.payload();
        let payload = serde_json::json!({
            "source": invocation.source,
            "entry_point": entry,
            "entry_error": entry_error,
            "context": invocation.context.to_payload(),
        });

        Ok(PreparedCommand {
            program: self.program.clone(),
            args: vec!["-u".to_string(), harness.display().to_string()],
            env: vec![
                ("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string()),
                ("PYTHONIOENCODING".to_string(), "utf-8".to_string()),
            ],
            stdin: Some(serde_json::to_vec(&payload)?),
        })
    }

    fn version_args(&self) -> Vec<&'static str> {
        vec!["--version"]
    }
}

/// @ai:intent Runs validation functions as POSIX shell scripts
pub struct ShellRuntime {
    program: String,
    import_regex: Regex,
}

impl ShellRuntime {
    pub fn new(interpreter: Option<String>) -> Self {
        Self {
            program: interpreter.unwrap_or_else(|| "sh".to_string()),
            import_regex: Regex::new(r"\bzerg_import\s+([A-Za-z_][\w.]*)").unwrap(),
        }
    }

    /// @ai:intent Environment variable carrying a context entry
    /// @ai:effects pure
    pub fn state_variable(name: &str) -> String {
        let key: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("ZERG_STATE_{key}")
    }
}

impl CandidateRuntime for ShellRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Shell
    }

    fn program(&self) -> &str {
        &self.program
    }

    fn module_extension(&self) -> &'static str {
        "sh"
    }

    fn package_marker(&self) -> Option<&'static str> {
        None
    }

    fn imported_modules(&self, source: &str) -> BTreeSet<String> {
        self.import_regex
            .captures_iter(source)
            .map(|cap| cap[1].to_string())
            .collect()
    }

    fn prepare(
        &self,
        scratch: &Path,
        invocation: &Invocation<'_>,
    ) -> Result<PreparedCommand, SandboxError> {
        let harness = scratch.join("zerg_harness.sh");
        let body = scratch.join("zerg_validation.sh");
        let mut env = Vec::new();
        let mut script = String::new();

        for (name, value) in invocation.context.iter() {
            match value {
                ResolvedValue::Function(function) => {
                    script.push_str(&function.source);
                    script.push('\n');
                }
                ResolvedValue::Absent => {}
                ResolvedValue::Literal(serde_json::Value::Null) => {}
                other => {
                    let rendered = match other.to_payload() {
                        serde_json::Value::String(s) => s,
                        json => json.to_string(),
                    };
                    env.push((Self::state_variable(name), rendered));
                }
            }
        }

        script.push_str(invocation.source);
        script.push('\n');

        std::fs::write(&harness, SHELL_HARNESS)?;
        std::fs::write(&body, script)?;

        Ok(PreparedCommand {
            program: self.program.clone(),
            args: vec![harness.display().to_string(), body.display().to_string()],
            env,
            stdin: None,
        })
    }

    fn version_args(&self) -> Vec<&'static str> {
        vec!["-c", "true"]
    }
}

const PYTHON_HARNESS: &str = r##"import asyncio
import inspect
import json
import linecache
import os
import sys

SENTINEL = "__ZERG_OUTCOME__"
TRANSIENT_LIBRARIES = ("requests", "urllib3", "httpx", "aiohttp")


def emit(kind, message=""):
    sys.stdout.flush()
    sys.stdout.write("\n%s %s\n" % (SENTINEL, json.dumps({"kind": kind, "message": message})))
    sys.stdout.flush()


class ZergState(object):
    def __init__(self, values, functions):
        object.__setattr__(self, "_values", dict(values))
        object.__setattr__(self, "_functions", dict(functions))

    def get(self, name, default=None):
        if name in self._functions:
            return self._functions[name]
        value = self._values.get(name)
        return default if value is None else value

    def require(self, name):
        if name in self._functions:
            return self._functions[name]
        if name not in self._values:
            raise KeyError("config '%s' is not defined" % name)
        if self._values[name] is None:
            raise KeyError("config '%s' is absent" % name)
        return self._values[name]

    def __getitem__(self, name):
        return self.require(name)

    def __contains__(self, name):
        return name in self._values or name in self._functions

    def __setattr__(self, name, value):
        raise AttributeError("zerg_state is read-only")

    def __setitem__(self, name, value):
        raise TypeError("zerg_state is read-only")


def register(filename, source):
    linecache.cache[filename] = (len(source), None, source.splitlines(True), filename)


def bind(name, source):
    filename = "<config:%s>" % name
    register(filename, source)
    namespace = {"__name__": "__zerg_config__"}
    exec(compile(source, filename, "exec"), namespace)
    if callable(namespace.get(name)):
        return namespace[name]
    defined = [
        value for value in namespace.values()
        if inspect.isfunction(value) and value.__code__.co_filename == filename
    ]
    if not defined:
        raise ValueError("config function '%s' defines no function" % name)
    return defined[-1]


def is_transient(exc):
    if isinstance(exc, (ConnectionError, TimeoutError)):
        return True
    try:
        import socket
        import urllib.error
        if isinstance(exc, (urllib.error.URLError, socket.gaierror, socket.timeout)):
            return True
    except ImportError:
        pass
    for cls in type(exc).__mro__:
        root = (cls.__module__ or "").split(".")[0]
        if root in TRANSIENT_LIBRARIES and ("Connection" in cls.__name__ or "Timeout" in cls.__name__):
            return True
    return False


def classify(exc):
    if isinstance(exc, AssertionError):
        return "assertion"
    if isinstance(exc, ImportError):
        return "import"
    if is_transient(exc):
        return "transient"
    return "exception"


def failing_line(exc):
    frames = [
        frame for frame in __import__("traceback").extract_tb(exc.__traceback__)
        if frame.filename == "<validation>"
    ]
    if frames and frames[-1].line:
        return frames[-1].line.strip()
    return None


def describe(exc, kind):
    text = str(exc)
    line = failing_line(exc)
    if kind == "assertion":
        if text and line:
            return "AssertionError: %s (at: %s)" % (text, line)
        if line:
            return "AssertionError: %s" % line
        return "AssertionError: %s" % text
    return "%s: %s" % (type(exc).__name__, text)


def main():
    payload = json.load(sys.stdin)
    sys.path.insert(0, os.getcwd())
    source = payload["source"]
    entry = payload.get("entry_point")
    entry_error = payload.get("entry_error")
    context = payload.get("context") or {}

    try:
        functions = dict(
            (name, bind(name, body)) for name, body in (context.get("functions") or {}).items()
        )
        state = ZergState(context.get("values") or {}, functions)
        register("<validation>", source)
        namespace = {"__name__": "__zerg_validation__", "zerg_state": state}
        exec(compile(source, "<validation>", "exec"), namespace)
        if entry_error:
            raise LookupError(entry_error)
        if entry:
            function = namespace.get(entry)
            if not callable(function):
                raise NameError("validation function '%s' is not callable" % entry)
            if len(inspect.signature(function).parameters) >= 1:
                result = function(state)
            else:
                result = function()
            if inspect.iscoroutine(result):
                asyncio.run(result)
        emit("pass")
    except SystemExit as exc:
        emit("exception", "SystemExit: %s" % (exc.code,))
    except BaseException as exc:
        kind = classify(exc)
        emit(kind, describe(exc, kind))


main()
"##;

const SHELL_HARNESS: &str = r##"ZERG_SENTINEL='__ZERG_OUTCOME__'
ZERG_DONE=0

zerg_escape() {
    printf '%s' "$1" | sed -e 's/\\/\\\\/g' -e 's/"/\\"/g' | tr '\n\t\r' '   '
}

zerg_emit() {
    ZERG_DONE=1
    printf '\n%s {"kind":"%s","message":"%s"}\n' "$ZERG_SENTINEL" "$1" "$(zerg_escape "$2")"
    exit 0
}

zerg_finish() {
    zerg_status=$?
    trap - EXIT
    if [ "$ZERG_DONE" = 1 ]; then
        exit 0
    fi
    case "$zerg_status" in
        0) zerg_emit pass "" ;;
        127) zerg_emit import "ImportError: command not found (exit status 127)" ;;
        *) zerg_emit exception "validation exited with status $zerg_status" ;;
    esac
}

zerg_key() {
    printf '%s' "$1" | tr '[:lower:]' '[:upper:]' | tr -c '[:alnum:]' '_'
}

zerg_get() {
    eval "printf '%s' \"\${ZERG_STATE_$(zerg_key "$1")-}\""
}

zerg_require() {
    if ! eval "[ \"\${ZERG_STATE_$(zerg_key "$1")+set}\" = set ]"; then
        zerg_emit exception "KeyError: config '$1' is absent"
    fi
}

zerg_import() {
    if [ -f "./$1.sh" ]; then
        . "./$1.sh"
    else
        zerg_emit import "ImportError: No module named '$1'"
    fi
}

zerg_assert_eq() {
    if [ "$1" != "$2" ]; then
        zerg_emit assertion "AssertionError: ${3:-expected '$2' but got '$1'}"
    fi
}

zerg_fail() {
    zerg_emit assertion "AssertionError: $1"
}

zerg_transient() {
    zerg_emit transient "$1"
}

trap zerg_finish EXIT
set -e
. "$1"
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{DeferredFunction, SecretString};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_python_imported_modules() {
        let source = r#"
def test_hello():
    from main import hello_world
    import connector.client as c, json
    assert hello_world() == "Hello World"
"#;
        let modules: Vec<_> = PythonRuntime::new(None)
            .imported_modules(source)
            .into_iter()
            .collect();
        assert_eq!(modules, vec!["connector", "json", "main"]);
    }

    #[test]
    fn test_python_entry_point() {
        let runtime = PythonRuntime::new(None);
        assert_eq!(
            runtime.entry_point("import os\n\ndef test_it(zerg_state):\n    pass\n"),
            EntryPoint::Function("test_it".to_string())
        );
        assert_eq!(
            runtime.entry_point("async def run():\n    pass\n"),
            EntryPoint::Function("run".to_string())
        );
        assert_eq!(runtime.entry_point("assert 1 == 1\n"), EntryPoint::Script);
    }

    #[test]
    fn test_python_entry_point_skips_helpers() {
        let runtime = PythonRuntime::new(None);
        let helper_first = "def expected():\n    return 'Hello World'\n\n\
                            def test_hello():\n    assert True\n\n\
                            def cleanup():\n    pass\n";
        assert_eq!(
            runtime.entry_point(helper_first),
            EntryPoint::Function("test_hello".to_string())
        );

        let no_test_prefix = "def expected():\n    return 1\n\ndef check():\n    assert expected() == 1\n";
        assert_eq!(
            runtime.entry_point(no_test_prefix),
            EntryPoint::Function("check".to_string())
        );

        let nested = "def test_outer():\n    def inner():\n        pass\n    inner()\n";
        assert_eq!(
            runtime.entry_point(nested),
            EntryPoint::Function("test_outer".to_string())
        );
    }

    #[test]
    fn test_python_ambiguous_entry_point_fails_closed() {
        let runtime = PythonRuntime::new(None);
        let source = "def test_a():\n    pass\n\ndef test_b():\n    assert False\n";
        assert_eq!(
            runtime.entry_point(source),
            EntryPoint::Ambiguous(vec!["test_a".to_string(), "test_b".to_string()])
        );

        let scratch = TempDir::new().unwrap();
        let context = ExecutionContext::default();
        let invocation = Invocation {
            source,
            context: &context,
            workspace: scratch.path(),
        };
        let prepared = runtime.prepare(scratch.path(), &invocation).unwrap();
        let payload: serde_json::Value =
            serde_json::from_slice(prepared.stdin.as_ref().unwrap()).unwrap();
        assert!(payload["entry_point"].is_null());
        assert!(payload["entry_error"]
            .as_str()
            .unwrap()
            .contains("test_a, test_b"));
    }

    #[test]
    fn test_python_prepare_writes_payload() {
        let scratch = TempDir::new().unwrap();
        let context = ExecutionContext::new(BTreeMap::from([(
            "limit".to_string(),
            ResolvedValue::Literal(serde_json::json!(10)),
        )]));
        let invocation = Invocation {
            source: "def t(zerg_state):\n    pass\n",
            context: &context,
            workspace: scratch.path(),
        };

        let prepared = PythonRuntime::new(None)
            .prepare(scratch.path(), &invocation)
            .unwrap();

        assert_eq!(prepared.program, "python3");
        assert!(scratch.path().join("zerg_harness.py").is_file());
        let payload: serde_json::Value =
            serde_json::from_slice(prepared.stdin.as_ref().unwrap()).unwrap();
        assert_eq!(payload["entry_point"], "t");
        assert_eq!(payload["context"]["values"]["limit"], 10);
    }

    #[test]
    fn test_shell_prepare_exports_state() {
        let scratch = TempDir::new().unwrap();
        let context = ExecutionContext::new(BTreeMap::from([
            (
                "api-token".to_string(),
                ResolvedValue::Secret(SecretString::new("abc".to_string())),
            ),
            (
                "limits".to_string(),
                ResolvedValue::Literal(serde_json::json!([1, 2])),
            ),
            ("missing".to_string(), ResolvedValue::Absent),
            (
                "helper".to_string(),
                ResolvedValue::Function(DeferredFunction {
                    source: "helper() { echo hi; }".to_string(),
                }),
            ),
        ]));
        let invocation = Invocation {
            source: "zerg_assert_eq \"$(helper)\" hi",
            context: &context,
            workspace: scratch.path(),
        };

        let prepared = ShellRuntime::new(None)
            .prepare(scratch.path(), &invocation)
            .unwrap();

        assert_eq!(
            prepared.env,
            vec![
                ("ZERG_STATE_API_TOKEN".to_string(), "abc".to_string()),
                ("ZERG_STATE_LIMITS".to_string(), "[1,2]".to_string()),
            ]
        );
        let body = std::fs::read_to_string(scratch.path().join("zerg_validation.sh")).unwrap();
        assert!(body.starts_with("helper() { echo hi; }\n"));
    }

    #[test]
    fn test_shell_imported_modules() {
        let modules: Vec<_> = ShellRuntime::new(None)
            .imported_modules("zerg_import main\nzerg_import connector\n")
            .into_iter()
            .collect();
        assert_eq!(modules, vec!["connector", "main"]);
    }

    #[test]
    fn test_runtime_for_honours_interpreter_override() {
        let config = SandboxConfig {
            runtime: RuntimeKind::Shell,
            interpreter: Some("/bin/dash".to_string()),
            ..Default::default()
        };
        let runtime = runtime_for(&config);
        assert_eq!(runtime.kind(), RuntimeKind::Shell);
        assert_eq!(runtime.program(), "/bin/dash");
    }
}
