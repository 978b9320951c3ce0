//! Built-in command interpreter for the web console.
//!
//! The console contract only needs an opaque "run this string" service.
//! The host build ships a small interpreter covering the commands the
//! recovery UI actually issues; a board port would swap in its real
//! shell behind the same trait.

use std::sync::{Arc, Mutex};

use failsafe_core::{
    console::{CommandInterpreter, ConsoleRing},
    env::EnvStore,
};

/// Minimal shell: `help`, `version`, `echo`, `printenv`, `setenv`.
pub struct ShellInterpreter {
    env: Arc<Mutex<EnvStore>>,
    version: String,
}

impl ShellInterpreter {
    /// Interpreter over the shared environment.
    #[must_use]
    pub fn new(env: Arc<Mutex<EnvStore>>, version: String) -> Self {
        Self { env, version }
    }

    fn printenv(&self, name: Option<&str>, console: &mut ConsoleRing) -> i32 {
        let Ok(env) = self.env.lock() else {
            console.write(b"## Error: environment unavailable\n");
            return 1;
        };
        match name {
            None => {
                console.write(env.export_text().as_bytes());
                0
            },
            Some(name) => match env.get(name) {
                Some(value) => {
                    console.write(name.as_bytes());
                    console.write(b"=");
                    console.write(value);
                    console.write(b"\n");
                    0
                },
                None => {
                    console.write(format!("## Error: \"{name}\" not defined\n").as_bytes());
                    1
                },
            },
        }
    }

    fn setenv(&self, args: &str, console: &mut ConsoleRing) -> i32 {
        let mut parts = args.splitn(2, ' ');
        let Some(name) = parts.next().filter(|n| !n.is_empty()) else {
            console.write(b"setenv: usage: setenv name [value]\n");
            return 1;
        };

        let Ok(mut env) = self.env.lock() else {
            console.write(b"## Error: environment unavailable\n");
            return 1;
        };
        let result = match parts.next() {
            Some(value) => env.set(name, value.as_bytes()),
            None => env.unset(name),
        };
        match result {
            Ok(()) => 0,
            Err(err) => {
                console.write(format!("setenv: {err}\n").as_bytes());
                1
            },
        }
    }
}

impl CommandInterpreter for ShellInterpreter {
    fn run(&mut self, cmd: &str, console: &mut ConsoleRing) -> i32 {
        let cmd = cmd.trim();
        let (word, args) = cmd.split_once(' ').unwrap_or((cmd, ""));
        let args = args.trim();

        match word {
            "" => 0,
            "help" => {
                console.write(b"help      - list commands\n");
                console.write(b"version   - print version\n");
                console.write(b"echo      - echo arguments\n");
                console.write(b"printenv  - print environment\n");
                console.write(b"setenv    - set or delete a variable\n");
                0
            },
            "version" => {
                console.write(self.version.as_bytes());
                console.write(b"\n");
                0
            },
            "echo" => {
                console.write(args.as_bytes());
                console.write(b"\n");
                0
            },
            "printenv" => {
                self.printenv(if args.is_empty() { None } else { Some(args) }, console)
            },
            "setenv" => self.setenv(args, console),
            other => {
                console.write(
                    format!("Unknown command '{other}' - try 'help'\n").as_bytes(),
                );
                1
            },
        }
    }
}
