//! First-match selection among registered map options.

use std::io::{Read, Seek};

use log::{debug, info};

use crate::{
    error::{MAP_NOT_FOUND, MapError},
    option::MappingOption,
};

#[derive(Debug)]
pub enum Resolution<'a> {
    Matched {
        index: usize,
        option: &'a MappingOption,
    },
    NoMatch {
        message: &'static str,
    },
}

impl<'a> Resolution<'a> {
    pub fn option(&self) -> Option<&'a MappingOption> {
        match self {
            Resolution::Matched { option, .. } => Some(*option),
            Resolution::NoMatch { .. } => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Resolution::Matched { .. })
    }

    pub fn into_result(self) -> Result<&'a MappingOption, MapError> {
        match self {
            Resolution::Matched { option, .. } => Ok(option),
            Resolution::NoMatch { .. } => Err(MapError::NoMappingMatched),
        }
    }
}

/// Returns the first option in `options` whose `can_map` accepts `stream`.
///
/// Later options are never consulted once one matches, so callers order the
/// list by priority. Only configuration errors (an unsupported source format)
/// propagate; an unreadable file is simply a non-match.
pub fn resolve<'a, S: Read + Seek>(
    options: &'a [MappingOption],
    stream: &mut S,
) -> Result<Resolution<'a>, MapError> {
    for (index, option) in options.iter().enumerate() {
        if option.can_map(stream)? {
            info!("Selected {option} (option {} of {})", index + 1, options.len());
            return Ok(Resolution::Matched { index, option });
        }
        debug!("{option} cannot map the file");
    }
    info!("None of {} map option(s) matched", options.len());
    Ok(Resolution::NoMatch {
        message: MAP_NOT_FOUND,
    })
}

/// An ordered list of options evaluated fresh for every file.
#[derive(Debug, Default)]
pub struct MappingResolver {
    options: Vec<MappingOption>,
}

impl MappingResolver {
    pub fn new(options: Vec<MappingOption>) -> Self {
        Self { options }
    }

    pub fn push(&mut self, option: MappingOption) -> &mut Self {
        self.options.push(option);
        self
    }

    pub fn options(&self) -> &[MappingOption] {
        &self.options
    }

    pub fn resolve<S: Read + Seek>(&self, stream: &mut S) -> Result<Resolution<'_>, MapError> {
        resolve(&self.options, stream)
    }
}
