use custom_error::custom_error;

custom_error! {pub LbvError
    BadParameter{msg: String} = "Bad parameter: {msg}",
    InvalidConfiguration{msg: String} = "Invalid configuration: {msg}",
    LibraryLoad{msg: String} = "Failed to load tunnel library: {msg}",
    SymbolNotFound{name: String} = "Missing symbol in tunnel library: {name}",
    IsolateCreate{status: i32} = "Failed to create isolate (status {status})",
    IsolateTeardown{status: i32} = "Failed to tear down isolate (status {status})",
    TunnelUp{code: i32} = "Failed to bring tunnel up (error code {code})",
    TunnelDown{status: i32, code: i32} = "Failed to bring tunnel down (status {status}, error code {code})",
    NativeCall{call: String, status: i32} = "Native call {call} failed (status {status})",
}
