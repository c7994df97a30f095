use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into the failure domains of the patching engine. Each one is recovered at
/// the smallest enclosing scope that still allows forward progress: a resolution failure aborts
/// the single hierarchy query (and the transform that needed it), a registration failure skips one
/// definition, an action failure drops one invocation. Nothing crosses the interception hook.
///
/// # Error Categories
///
/// ## Class File Errors
/// - [`Error::Malformed`] - Corrupted or invalid class file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the input
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::CodeTooLarge`] - A rewritten method no longer fits the class file limits
///
/// ## Engine Errors
/// - [`Error::Resolution`] - A type header could not be found or read
/// - [`Error::Registration`] - A patch definition was rejected
/// - [`Error::Action`] - A patch action reported a failure
/// - [`Error::RecursionLimit`] - Maximum hierarchy depth exceeded
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Settings`] - Settings text is not valid TOML
///
/// # Examples
///
/// ```rust
/// use classmend::{classfile::ClassFile, Error};
///
/// match ClassFile::parse(&[0xCA, 0xFE]) {
///     Ok(class) => println!("Parsed {}", class.name),
///     Err(Error::OutOfBounds) => eprintln!("Truncated class file"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed class: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Class file Errors
    /// The class file is damaged and could not be parsed or written.
    ///
    /// The error includes the source location where the malformation was detected for debugging
    /// purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the input.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// A method body or constant pool grew beyond the limits of the class file format.
    ///
    /// The associated value names the structure that overflowed.
    #[error("Exceeded class file limits - {0}")]
    CodeTooLarge(String),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while reading class resources or exporting
    /// rewritten classes.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Settings text could not be parsed.
    #[error("Invalid settings - {0}")]
    Settings(#[from] toml::de::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    // Engine Errors
    /// The binary header of a type could not be found or read.
    ///
    /// Raised by the hierarchy resolver when neither the active loader nor the bootstrap
    /// resource space provides the named type. Fatal to the query that triggered it.
    #[error("Could not resolve type - {0}")]
    Resolution(String),

    /// A patch definition was rejected at registration time.
    ///
    /// # Fields
    ///
    /// * `definition` - Name of the rejected definition
    /// * `message` - Why the definition was rejected
    #[error("Invalid patch definition {definition} - {message}")]
    Registration {
        /// The name of the rejected definition
        definition: String,
        /// The reason for the rejection
        message: String,
    },

    /// A patch action failed while being applied to one match.
    #[error("Patch action {action} failed - {message}")]
    Action {
        /// The name of the failing action
        action: String,
        /// The reported failure
        message: String,
    },

    /// Recursion limit reached.
    ///
    /// Type hierarchies are resolved recursively. Cyclic or absurdly deep hierarchies in
    /// malformed input stop at this limit instead of overflowing the stack.
    ///
    /// The associated value shows the recursion limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),
}

impl Error {
    /// Builds an [`Error::Action`] from any displayable failure.
    ///
    /// Convenience for patch actions that want to abort a single invocation.
    pub fn action(action: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Action {
            action: action.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn registration(definition: &str, message: impl std::fmt::Display) -> Self {
        Error::Registration {
            definition: definition.to_string(),
            message: message.to_string(),
        }
    }
}
