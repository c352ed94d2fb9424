use bytes::BytesMut;
use tracing::warn;

/// Smallest command-in region that holds a single-word command.
pub const MIN_COMMAND_BYTES: usize = 24;

/// Smallest result-out region that holds a header, status and one word.
pub const MIN_RESULT_BYTES: usize = 12;

/// Smallest register file: the control register alone.
pub const MIN_REGISTER_BYTES: usize = 1;

/// One contiguous region of the backend resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Byte offset from the start of the resource.
    pub offset: usize,
    /// Size in bytes.
    pub size: usize,
}

impl Region {
    /// Whole 32-bit words the region holds.
    pub fn words(&self) -> usize {
        self.size / 4
    }

    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Placement of the three regions: command-in, then result-out, then the
/// register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub command_in: Region,
    pub result_out: Region,
    pub register_file: Region,
}

impl BufferLayout {
    /// Compute offsets from the byte sizes the backend reports.
    pub fn from_sizes(command_bytes: usize, result_bytes: usize, register_bytes: usize) -> Self {
        Self {
            command_in: Region {
                offset: 0,
                size: command_bytes,
            },
            result_out: Region {
                offset: command_bytes,
                size: result_bytes,
            },
            register_file: Region {
                offset: command_bytes + result_bytes,
                size: register_bytes,
            },
        }
    }

    pub fn total_size(&self) -> usize {
        self.register_file.end()
    }

    /// Names of the regions that are below their protocol minimum.
    pub fn undersized(&self) -> Vec<&'static str> {
        let mut short = Vec::new();
        if self.command_in.size < MIN_COMMAND_BYTES {
            short.push("command-in");
        }
        if self.result_out.size < MIN_RESULT_BYTES {
            short.push("result-out");
        }
        if self.register_file.size < MIN_REGISTER_BYTES {
            short.push("register-file");
        }
        short
    }
}

/// Host-side mirror of the backend regions, in one allocation.
///
/// Commands are staged in the command-in slice before they are written;
/// results and registers are read into their slices before decoding.
#[derive(Debug)]
pub struct Buffers {
    layout: BufferLayout,
    backing: BytesMut,
    degraded: bool,
}

impl Buffers {
    /// Allocate for `layout`. Undersized regions are allocated anyway and the
    /// buffers are marked degraded.
    pub fn allocate(layout: BufferLayout) -> Self {
        let undersized = layout.undersized();
        if !undersized.is_empty() {
            warn!(
                regions = ?undersized,
                command_bytes = layout.command_in.size,
                result_bytes = layout.result_out.size,
                register_bytes = layout.register_file.size,
                "message buffer regions below protocol minimum"
            );
        }
        Self {
            layout,
            backing: BytesMut::zeroed(layout.total_size()),
            degraded: !undersized.is_empty(),
        }
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn command_in(&self) -> &[u8] {
        self.slice(self.layout.command_in)
    }

    pub fn command_in_mut(&mut self) -> &mut [u8] {
        let region = self.layout.command_in;
        self.slice_mut(region)
    }

    pub fn result_out(&self) -> &[u8] {
        self.slice(self.layout.result_out)
    }

    pub fn result_out_mut(&mut self) -> &mut [u8] {
        let region = self.layout.result_out;
        self.slice_mut(region)
    }

    pub fn register_file(&self) -> &[u8] {
        self.slice(self.layout.register_file)
    }

    pub fn register_file_mut(&mut self) -> &mut [u8] {
        let region = self.layout.register_file;
        self.slice_mut(region)
    }

    fn slice(&self, region: Region) -> &[u8] {
        &self.backing[region.offset..region.end()]
    }

    fn slice_mut(&mut self, region: Region) -> &mut [u8] {
        &mut self.backing[region.offset..region.end()]
    }
}
