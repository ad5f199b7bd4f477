//! Typed, named state slots that survive across the START and END invocations.
//!
//! Each [`StateField`] resolves its value once, at declaration:
//!
//! 1. an explicit, non-empty input decoded with the field's [`Codec`];
//!    a present value is optionally persisted straight away,
//! 2. otherwise (and always during [`RunPhase::End`]) the persisted value,
//! 3. otherwise the declared default, with `found == false`.
//!
//! The two phases never share memory; this store is their only channel.
//! Absence of a persisted value is normal, not an error. At most one phase
//! runs at a time per job, so there is no locking here; porting this to a
//! host without that guarantee needs a synchronization story first.

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::core::types::{MatrixContext, RunPhase};
use crate::error::NotifyError;
use crate::io::platform::{Platform, Scope};

/// Persisted literal treated as "no value" for every codec. Explicit inputs
/// only honor it for codecs with `null_input_is_absent`.
pub const NULL_SENTINEL: &str = "null";

/// Step-scoped flag whose presence marks the END invocation.
pub const IS_POST_FIELD: &str = "is-post";

/// Whether a decoded value counts as "a value was supplied".
pub trait FieldValue: Clone {
    fn is_present(&self) -> bool;
}

impl FieldValue for String {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl FieldValue for bool {
    fn is_present(&self) -> bool {
        *self
    }
}

impl FieldValue for MatrixContext {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<V: Clone> FieldValue for std::collections::BTreeMap<String, V> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

/// Round-trip string codec for a field.
pub struct Codec<T> {
    pub parse: fn(&str) -> Result<T, String>,
    pub serialize: fn(&T) -> String,
    /// A literal `null` input means "not supplied" rather than the text `null`.
    pub null_input_is_absent: bool,
}

impl<T> Clone for Codec<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Codec<T> {}

impl<T> Codec<T> {
    fn accepts_input(&self, raw: &str) -> bool {
        !raw.is_empty() && !(self.null_input_is_absent && raw == NULL_SENTINEL)
    }
}

impl Codec<String> {
    /// Opaque string, stored as-is.
    pub fn text() -> Self {
        Self {
            parse: |raw| Ok(raw.to_string()),
            serialize: String::clone,
            null_input_is_absent: false,
        }
    }
}

impl Codec<bool> {
    /// Any non-empty string reads as `true`.
    pub fn flag() -> Self {
        Self {
            parse: |raw| Ok(!raw.is_empty()),
            serialize: |value| value.to_string(),
            null_input_is_absent: false,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Codec<T> {
    /// JSON document, for composite fields.
    pub fn json() -> Self {
        Self {
            parse: |raw| serde_json::from_str(raw).map_err(|err| err.to_string()),
            serialize: |value| serde_json::to_string(value).unwrap_or_else(|_| NULL_SENTINEL.to_string()),
            null_input_is_absent: true,
        }
    }
}

/// Declaration options for one field.
#[derive(Clone)]
pub struct FieldOptions<T> {
    pub default: T,
    pub codec: Codec<T>,
    /// Fail declaration when no value can be resolved from input.
    pub required: bool,
    /// Republish every `set` as a step output.
    pub expose_as_output: bool,
    /// Consult explicit inputs, not just persisted state.
    pub read_from_input: bool,
    /// Persist a value resolved from input right away.
    pub persist_input_value: bool,
    /// Mask the value in runner logs.
    pub sensitive: bool,
    pub scope: Scope,
}

impl<T> FieldOptions<T> {
    pub fn new(default: T, codec: Codec<T>) -> Self {
        Self {
            default,
            codec,
            required: false,
            expose_as_output: false,
            read_from_input: true,
            persist_input_value: true,
            sensitive: false,
            scope: Scope::Job,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn output(mut self) -> Self {
        self.expose_as_output = true;
        self
    }

    pub fn state_only(mut self) -> Self {
        self.read_from_input = false;
        self
    }

    pub fn keep_input_unpersisted(mut self) -> Self {
        self.persist_input_value = false;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

impl FieldOptions<String> {
    pub fn text() -> Self {
        Self::new(String::new(), Codec::text())
    }
}

impl FieldOptions<bool> {
    pub fn flag() -> Self {
        Self::new(false, Codec::flag())
    }
}

impl<T: Default + Serialize + DeserializeOwned> FieldOptions<T> {
    pub fn json() -> Self {
        Self::new(T::default(), Codec::json())
    }
}

/// A resolved, named, typed slot.
pub struct StateField<T> {
    name: String,
    value: T,
    found: bool,
    options: FieldOptions<T>,
}

impl<T> StateField<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Whether any source supplied the value (vs. falling back to default).
    pub fn found(&self) -> bool {
        self.found
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for StateField<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("StateField");
        s.field("name", &self.name).field("found", &self.found);
        if self.options.sensitive {
            s.field("value", &"<redacted>");
        } else {
            s.field("value", &self.value);
        }
        s.finish()
    }
}

/// Field resolution and write-through over a [`Platform`].
pub struct StateStore<P> {
    platform: P,
    phase: RunPhase,
}

impl<P: Platform> StateStore<P> {
    /// Wrap `platform`. The phase stays START until [`Self::detect_phase`].
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            phase: RunPhase::Start,
        }
    }

    /// Detect which phase this invocation is and mark the next one as END.
    ///
    /// The step-scoped `is-post` marker is read first, then written, so the
    /// next invocation of this action sees it.
    pub fn detect_phase(&mut self) -> Result<RunPhase> {
        let mut is_post = self.declare(
            IS_POST_FIELD,
            FieldOptions::flag().state_only().scope(Scope::Step),
        )?;
        self.phase = if *is_post.value() {
            RunPhase::End
        } else {
            RunPhase::Start
        };
        self.set(&mut is_post, true)?;
        debug!(phase = self.phase.as_str(), "run phase detected");
        Ok(self.phase)
    }

    /// Open with an explicit phase, bypassing detection.
    pub fn with_phase(platform: P, phase: RunPhase) -> Self {
        Self { platform, phase }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn into_platform(self) -> P {
        self.platform
    }

    /// Declare a field and resolve its current value.
    pub fn declare<T: FieldValue>(
        &mut self,
        name: &str,
        options: FieldOptions<T>,
    ) -> Result<StateField<T>> {
        let mut field = StateField {
            name: name.to_string(),
            value: options.default.clone(),
            found: false,
            options,
        };

        if field.options.read_from_input {
            let codec = field.options.codec;
            match self.platform.input(name).filter(|raw| codec.accepts_input(raw)) {
                Some(raw) => {
                    if field.options.sensitive {
                        self.platform.mask(&raw);
                    }
                    let parsed = (field.options.codec.parse)(&raw).map_err(|reason| {
                        NotifyError::InvalidFieldValue {
                            name: name.to_string(),
                            reason,
                        }
                    })?;
                    if parsed.is_present() {
                        debug!(field = name, "resolved from input");
                        field.found = true;
                        if field.options.persist_input_value {
                            self.set(&mut field, parsed)?;
                        } else {
                            field.value = parsed;
                        }
                    }
                }
                None if field.options.required => {
                    return Err(NotifyError::MissingRequiredField(name.to_string()).into());
                }
                None => {}
            }
        }

        // END always re-reads persisted state, so values written by START win.
        if !field.found || self.phase == RunPhase::End {
            if let Some(raw) = self
                .platform
                .load(field.options.scope, name)
                .filter(|raw| is_value(raw))
            {
                match (field.options.codec.parse)(&raw) {
                    Ok(parsed) if parsed.is_present() => {
                        debug!(field = name, "resolved from persisted state");
                        field.value = parsed;
                        field.found = true;
                    }
                    Ok(_) => {}
                    Err(reason) => warn!(field = name, %reason, "ignoring unreadable persisted value"),
                }
            }
        }

        if field.options.required && !field.found {
            return Err(NotifyError::MissingRequiredField(name.to_string()).into());
        }
        Ok(field)
    }

    /// Update a field and write it through to the platform.
    ///
    /// Job-scoped writes are skipped during END: nothing runs after END that
    /// could read them.
    pub fn set<T>(&mut self, field: &mut StateField<T>, value: T) -> Result<()> {
        let raw = (field.options.codec.serialize)(&value);
        field.value = value;
        field.found = true;

        if field.options.sensitive {
            self.platform.mask(&raw);
        }
        if field.options.scope == Scope::Job && self.phase == RunPhase::End {
            debug!(field = %field.name, "skipping persist during end phase");
        } else {
            self.platform.save(field.options.scope, &field.name, &raw)?;
        }
        if field.options.expose_as_output {
            self.platform.set_output(&field.name, &raw)?;
        }
        Ok(())
    }
}

fn is_value(raw: &str) -> bool {
    !raw.is_empty() && raw != NULL_SENTINEL
}
