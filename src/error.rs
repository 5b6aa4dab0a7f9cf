// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error type for congestion control operations.

use strum::IntoEnumIterator;
use strum_macros::EnumIter;

/// Congestion control error.
#[derive(Clone, Debug, Default, PartialEq, Eq, EnumIter)]
pub enum Error {
    /// The operation completed without any error.
    #[default]
    NoError,

    /// The controller encountered an internal error and cannot continue.
    InternalError,

    /// The configuration is invalid.
    InvalidConfig(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        for err in Error::iter() {
            assert!(!format!("{}", err).is_empty());
        }

        let e = Error::InvalidConfig("unknown".into());
        assert_eq!(format!("{}", e), "InvalidConfig(\"unknown\")");
    }

    #[test]
    fn error_source() {
        use std::error::Error;
        assert!(super::Error::InternalError.source().is_none());
    }
}
