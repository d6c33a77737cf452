//! Built-in native functions.
//!
//! The host assembles a [`HostContext`] (device bridge, current-device
//! slot, console sink) and registers every builtin into the interpreter's
//! global scope before evaluation begins. Each native closure captures the
//! shared context; there is no process-wide state.

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use crate::adb::{BridgeError, DeviceBridge};
use crate::interpreter::Interpreter;
use crate::value::{DeviceHandle, RuntimeError, Value};

/// Where script output lands: the process streams, or a capture buffer
/// used by tests.
#[derive(Clone)]
pub enum Console {
    Standard,
    Captured(Rc<RefCell<Vec<String>>>),
}

impl Console {
    pub fn captured() -> (Self, Rc<RefCell<Vec<String>>>) {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        (Self::Captured(Rc::clone(&buffer)), buffer)
    }

    pub fn line(&self, text: &str) {
        match self {
            Self::Standard => println!("{text}"),
            Self::Captured(buffer) => buffer.borrow_mut().push(text.to_string()),
        }
    }

    pub fn error_line(&self, text: &str) {
        match self {
            Self::Standard => eprintln!("{text}"),
            Self::Captured(buffer) => buffer.borrow_mut().push(text.to_string()),
        }
    }
}

pub struct HostContext {
    pub bridge: Box<dyn DeviceBridge>,
    pub current_device: RefCell<Option<String>>,
    pub console: Console,
}

impl HostContext {
    pub fn new(bridge: Box<dyn DeviceBridge>, console: Console) -> Rc<Self> {
        Rc::new(Self {
            bridge,
            current_device: RefCell::new(None),
            console,
        })
    }

    fn current_serial(&self) -> Result<String, RuntimeError> {
        self.current_device
            .borrow()
            .clone()
            .ok_or_else(|| RuntimeError::native("No device selected. Call Device() first."))
    }
}

fn register(
    interpreter: &mut Interpreter,
    host: &Rc<HostContext>,
    name: &str,
    func: impl Fn(&HostContext, &[Value]) -> Result<Value, RuntimeError> + 'static,
) {
    let host = Rc::clone(host);
    interpreter.define_global(name, Value::native(move |args| func(&host, args)));
}

fn join_args(args: &[Value]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn arity(args: &[Value], required: usize, usage: &str) -> Result<(), RuntimeError> {
    if args.len() < required {
        return Err(RuntimeError::native(usage));
    }
    Ok(())
}

fn int_arg(value: &Value) -> Result<i64, RuntimeError> {
    match value {
        Value::Int(value) => Ok(*value),
        Value::Float(value) => Ok(*value as i64),
        _ => Err(RuntimeError::native("Value is not a number")),
    }
}

fn str_arg(value: &Value) -> Result<&str, RuntimeError> {
    match value {
        Value::Str(value) => Ok(value),
        _ => Err(RuntimeError::native("Value is not a string")),
    }
}

fn bridge_failure(operation: &str) -> impl Fn(BridgeError) -> RuntimeError + '_ {
    move |error| RuntimeError::native(format!("{operation} failed: {error}"))
}

/// Probes a device's descriptive properties. An unreachable device still
/// gets a handle: failed probes fall back to placeholder values.
fn probe_device(host: &HostContext, serial: String) -> DeviceHandle {
    let model = host
        .bridge
        .model(&serial)
        .unwrap_or_else(|_| "Unknown".to_string());
    let android_version = host
        .bridge
        .android_version(&serial)
        .unwrap_or_else(|_| "Unknown".to_string());
    let (screen_width, screen_height) = host.bridge.screen_size(&serial).unwrap_or((1080, 1920));
    DeviceHandle {
        serial,
        model,
        screen_width,
        screen_height,
        android_version,
    }
}

pub fn register_builtins(interpreter: &mut Interpreter, host: Rc<HostContext>) {
    let host = &host;

    // Utility functions
    register(interpreter, host, "Print", |host, args| {
        host.console.line(&join_args(args));
        Ok(Value::Nil)
    });
    register(interpreter, host, "Log", |host, args| {
        host.console.line(&format!("[LOG] {}", join_args(args)));
        Ok(Value::Nil)
    });
    register(interpreter, host, "LogError", |host, args| {
        host.console
            .error_line(&format!("[ERROR] {}", join_args(args)));
        Ok(Value::Nil)
    });
    register(interpreter, host, "Sleep", |_, args| {
        arity(args, 1, "Sleep() requires 1 argument (milliseconds)")?;
        let ms = int_arg(&args[0])?;
        if ms < 0 {
            return Err(RuntimeError::native("Sleep() duration cannot be negative"));
        }
        thread::sleep(Duration::from_millis(ms as u64));
        Ok(Value::Nil)
    });
    register(interpreter, host, "Assert", |_, args| {
        arity(args, 1, "Assert() requires at least 1 argument")?;
        if !args[0].is_truthy() {
            let message = match args.get(1) {
                Some(detail) => format!("Assertion failed: {detail}"),
                None => "Assertion failed".to_string(),
            };
            return Err(RuntimeError::native(message));
        }
        Ok(Value::Nil)
    });

    // String functions
    register(interpreter, host, "Length", |_, args| {
        arity(args, 1, "Length() requires 1 argument")?;
        Ok(Value::Int(args[0].length()?))
    });
    register(interpreter, host, "Substring", |_, args| {
        arity(args, 3, "Substring() requires 3 arguments (string, start, end)")?;
        let chars: Vec<char> = str_arg(&args[0])?.chars().collect();
        let bounds = usize::try_from(int_arg(&args[1])?)
            .ok()
            .zip(usize::try_from(int_arg(&args[2])?).ok());
        match bounds {
            Some((start, end)) if start <= end && end <= chars.len() => {
                Ok(Value::Str(chars[start..end].iter().collect()))
            }
            _ => Err(RuntimeError::native("Invalid substring indices")),
        }
    });
    register(interpreter, host, "ToUpper", |_, args| {
        arity(args, 1, "ToUpper() requires 1 argument")?;
        Ok(Value::Str(str_arg(&args[0])?.to_ascii_uppercase()))
    });
    register(interpreter, host, "ToLower", |_, args| {
        arity(args, 1, "ToLower() requires 1 argument")?;
        Ok(Value::Str(str_arg(&args[0])?.to_ascii_lowercase()))
    });
    register(interpreter, host, "Contains", |_, args| {
        arity(args, 2, "Contains() requires 2 arguments (string, substring)")?;
        let haystack = str_arg(&args[0])?;
        let needle = str_arg(&args[1])?;
        Ok(Value::Bool(haystack.contains(needle)))
    });
    register(interpreter, host, "Replace", |_, args| {
        arity(args, 3, "Replace() requires 3 arguments (string, old, new)")?;
        let subject = str_arg(&args[0])?;
        let old = str_arg(&args[1])?;
        let new = str_arg(&args[2])?;
        Ok(Value::Str(subject.replace(old, new)))
    });

    // Array functions
    register(interpreter, host, "Count", |_, args| {
        arity(args, 1, "Count() requires 1 argument")?;
        Ok(Value::Int(args[0].length()?))
    });
    register(interpreter, host, "Push", |_, args| {
        arity(args, 2, "Push() requires 2 arguments (array, value)")?;
        args[0].push(args[1].clone())?;
        Ok(args[0].clone())
    });
    register(interpreter, host, "Pop", |_, args| {
        arity(args, 1, "Pop() requires 1 argument")?;
        args[0].pop()
    });
    register(interpreter, host, "Join", |_, args| {
        arity(args, 2, "Join() requires 2 arguments (array, separator)")?;
        let Value::Array(values) = &args[0] else {
            return Err(RuntimeError::native(format!(
                "Join() requires an array, got {}",
                args[0].type_name()
            )));
        };
        let separator = str_arg(&args[1])?;
        let joined = values
            .borrow()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(separator);
        Ok(Value::Str(joined))
    });

    // Type conversion
    register(interpreter, host, "ToString", |_, args| {
        arity(args, 1, "ToString() requires 1 argument")?;
        Ok(Value::Str(args[0].to_string()))
    });
    register(interpreter, host, "ToInt", |_, args| {
        arity(args, 1, "ToInt() requires 1 argument")?;
        match &args[0] {
            Value::Int(value) => Ok(Value::Int(*value)),
            Value::Float(value) => Ok(Value::Int(*value as i64)),
            Value::Str(value) => value
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| RuntimeError::native("Cannot convert string to integer")),
            _ => Err(RuntimeError::native("Cannot convert to integer")),
        }
    });
    register(interpreter, host, "ToFloat", |_, args| {
        arity(args, 1, "ToFloat() requires 1 argument")?;
        match &args[0] {
            Value::Float(value) => Ok(Value::Float(*value)),
            Value::Int(value) => Ok(Value::Float(*value as f64)),
            Value::Str(value) => value
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| RuntimeError::native("Cannot convert string to float")),
            _ => Err(RuntimeError::native("Cannot convert to float")),
        }
    });

    // File operations
    register(interpreter, host, "FileExists", |_, args| {
        arity(args, 1, "FileExists() requires 1 argument")?;
        Ok(Value::Bool(Path::new(str_arg(&args[0])?).exists()))
    });
    register(interpreter, host, "ReadFile", |_, args| {
        arity(args, 1, "ReadFile() requires 1 argument")?;
        let path = str_arg(&args[0])?;
        fs::read_to_string(path)
            .map(Value::Str)
            .map_err(|_| RuntimeError::native(format!("Cannot open file: {path}")))
    });
    register(interpreter, host, "WriteFile", |_, args| {
        arity(args, 2, "WriteFile() requires 2 arguments (path, content)")?;
        let path = str_arg(&args[0])?;
        let content = str_arg(&args[1])?;
        fs::write(path, content)
            .map(|_| Value::Nil)
            .map_err(|_| RuntimeError::native(format!("Cannot write to file: {path}")))
    });

    // Device management
    register(interpreter, host, "Device", |host, args| {
        let serial = if let Some(value) = args.first() {
            let serial = str_arg(value)?.to_string();
            let exists = host
                .bridge
                .device_exists(&serial)
                .map_err(bridge_failure("Device"))?;
            if !exists {
                return Err(RuntimeError::native(format!("Device not found: {serial}")));
            }
            serial
        } else {
            let devices = host
                .bridge
                .list_devices()
                .map_err(bridge_failure("Device"))?;
            if devices.is_empty() {
                return Err(RuntimeError::native(
                    "No Android devices found. Make sure USB debugging is enabled.",
                ));
            }
            match devices.iter().find(|device| device.is_online()) {
                Some(device) => device.serial.clone(),
                None => {
                    return Err(RuntimeError::native(format!(
                        "No online devices found. Device state: {}",
                        devices[0].state
                    )));
                }
            }
        };

        // This device becomes the target for the automation builtins.
        *host.current_device.borrow_mut() = Some(serial.clone());

        let device = probe_device(host, serial);
        host.console.line(&format!(
            "[DEVICE] Connected to {} (Android {}) [{}x{}]",
            device.model, device.android_version, device.screen_width, device.screen_height
        ));
        Ok(Value::Device(Rc::new(device)))
    });
    register(interpreter, host, "GetAllDevices", |host, _| {
        let devices = host
            .bridge
            .list_devices()
            .map_err(bridge_failure("GetAllDevices"))?;
        let handles = devices
            .into_iter()
            .map(|device| Value::Device(Rc::new(probe_device(host, device.serial))))
            .collect();
        Ok(Value::array(handles))
    });

    // UI automation
    register(interpreter, host, "Tap", |host, args| {
        arity(args, 2, "Tap() requires 2 arguments (x, y)")?;
        let serial = host.current_serial()?;
        let x = int_arg(&args[0])?;
        let y = int_arg(&args[1])?;
        host.console
            .line(&format!("[AUTOMATION] Tap({x}, {y}) on {serial}"));
        host.bridge
            .tap(&serial, x, y)
            .map_err(bridge_failure("Tap"))?;
        Ok(Value::Nil)
    });
    register(interpreter, host, "Swipe", |host, args| {
        arity(args, 5, "Swipe() requires 5 arguments (x1, y1, x2, y2, duration)")?;
        let serial = host.current_serial()?;
        let x1 = int_arg(&args[0])?;
        let y1 = int_arg(&args[1])?;
        let x2 = int_arg(&args[2])?;
        let y2 = int_arg(&args[3])?;
        let duration = int_arg(&args[4])?;
        host.console.line(&format!(
            "[AUTOMATION] Swipe({x1}, {y1} -> {x2}, {y2}, {duration}ms)"
        ));
        host.bridge
            .swipe(&serial, x1, y1, x2, y2, duration)
            .map_err(bridge_failure("Swipe"))?;
        Ok(Value::Nil)
    });
    register(interpreter, host, "Input", |host, args| {
        arity(args, 1, "Input() requires 1 argument")?;
        let serial = host.current_serial()?;
        let text = str_arg(&args[0])?;
        host.console
            .line(&format!("[AUTOMATION] Input(\"{text}\")"));
        host.bridge
            .input_text(&serial, text)
            .map_err(bridge_failure("Input"))?;
        Ok(Value::Nil)
    });
    register(interpreter, host, "KeyEvent", |host, args| {
        arity(args, 1, "KeyEvent() requires 1 argument (keycode)")?;
        let serial = host.current_serial()?;
        let keycode = str_arg(&args[0])?;
        host.console
            .line(&format!("[AUTOMATION] KeyEvent(\"{keycode}\")"));
        host.bridge
            .key_event(&serial, keycode)
            .map_err(bridge_failure("KeyEvent"))?;
        Ok(Value::Nil)
    });
    register(interpreter, host, "Screenshot", |host, args| {
        arity(args, 1, "Screenshot() requires 1 argument (path)")?;
        let serial = host.current_serial()?;
        let path = str_arg(&args[0])?;
        host.console
            .line(&format!("[AUTOMATION] Screenshot(\"{path}\")"));
        host.bridge
            .screenshot(&serial, path)
            .map_err(bridge_failure("Screenshot"))?;
        host.console
            .line(&format!("[AUTOMATION] Screenshot saved to: {path}"));
        Ok(Value::Nil)
    });

    // App management
    register(interpreter, host, "LaunchApp", |host, args| {
        arity(args, 1, "LaunchApp() requires 1 argument (package)")?;
        let serial = host.current_serial()?;
        let package = str_arg(&args[0])?;
        host.console.line(&format!("[APP] LaunchApp(\"{package}\")"));
        host.bridge
            .launch_app(&serial, package)
            .map_err(bridge_failure("LaunchApp"))?;
        Ok(Value::Nil)
    });
    register(interpreter, host, "StopApp", |host, args| {
        arity(args, 1, "StopApp() requires 1 argument (package)")?;
        let serial = host.current_serial()?;
        let package = str_arg(&args[0])?;
        host.console.line(&format!("[APP] StopApp(\"{package}\")"));
        host.bridge
            .stop_app(&serial, package)
            .map_err(bridge_failure("StopApp"))?;
        Ok(Value::Nil)
    });
    register(interpreter, host, "InstallApp", |host, args| {
        arity(args, 1, "InstallApp() requires 1 argument (apk_path)")?;
        let serial = host.current_serial()?;
        let apk_path = str_arg(&args[0])?;
        host.console
            .line(&format!("[APP] InstallApp(\"{apk_path}\")"));
        host.bridge
            .install_app(&serial, apk_path)
            .map_err(bridge_failure("InstallApp"))?;
        host.console.line("[APP] App installed successfully");
        Ok(Value::Nil)
    });
    register(interpreter, host, "UninstallApp", |host, args| {
        arity(args, 1, "UninstallApp() requires 1 argument (package)")?;
        let serial = host.current_serial()?;
        let package = str_arg(&args[0])?;
        host.console
            .line(&format!("[APP] UninstallApp(\"{package}\")"));
        host.bridge
            .uninstall_app(&serial, package)
            .map_err(bridge_failure("UninstallApp"))?;
        host.console.line("[APP] App uninstalled successfully");
        Ok(Value::Nil)
    });
    register(interpreter, host, "ClearAppData", |host, args| {
        arity(args, 1, "ClearAppData() requires 1 argument (package)")?;
        let serial = host.current_serial()?;
        let package = str_arg(&args[0])?;
        host.console
            .line(&format!("[APP] ClearAppData(\"{package}\")"));
        host.bridge
            .clear_app_data(&serial, package)
            .map_err(bridge_failure("ClearAppData"))?;
        host.console.line("[APP] App data cleared successfully");
        Ok(Value::Nil)
    });

    // Device file operations
    register(interpreter, host, "PushFile", |host, args| {
        arity(args, 2, "PushFile() requires 2 arguments (local_path, remote_path)")?;
        let serial = host.current_serial()?;
        let local_path = str_arg(&args[0])?;
        let remote_path = str_arg(&args[1])?;
        host.console.line(&format!(
            "[FILE] PushFile(\"{local_path}\" -> \"{remote_path}\")"
        ));
        host.bridge
            .push_file(&serial, local_path, remote_path)
            .map_err(bridge_failure("PushFile"))?;
        host.console.line("[FILE] File pushed successfully");
        Ok(Value::Nil)
    });
    register(interpreter, host, "PullFile", |host, args| {
        arity(args, 2, "PullFile() requires 2 arguments (remote_path, local_path)")?;
        let serial = host.current_serial()?;
        let remote_path = str_arg(&args[0])?;
        let local_path = str_arg(&args[1])?;
        host.console.line(&format!(
            "[FILE] PullFile(\"{remote_path}\" -> \"{local_path}\")"
        ));
        host.bridge
            .pull_file(&serial, remote_path, local_path)
            .map_err(bridge_failure("PullFile"))?;
        host.console.line("[FILE] File pulled successfully");
        Ok(Value::Nil)
    });
}
