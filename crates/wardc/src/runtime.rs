//! The C base header every generated package relies on.
//!
//! Generated code only ever calls the helpers and macros defined here, so a
//! package can be compiled against this header alone.

/// Base status messages, keyed by their source spelling.
pub const BASE_STATUSES: &[(&str, &str)] = &[
    ("#bad argument", "ward_base__error__bad_argument"),
    ("#bad call sequence", "ward_base__error__bad_call_sequence"),
    ("#bad receiver", "ward_base__error__bad_receiver"),
    ("#bad sizeof receiver", "ward_base__error__bad_sizeof_receiver"),
    ("#bad version", "ward_base__error__bad_version"),
    (
        "#cannot return a suspension",
        "ward_base__error__cannot_return_a_suspension",
    ),
    (
        "#disabled by previous error",
        "ward_base__error__disabled_by_previous_error",
    ),
    (
        "#initialize falsely claimed already zeroed",
        "ward_base__error__initialize_falsely_claimed_already_zeroed",
    ),
    (
        "#initialize not called",
        "ward_base__error__initialize_not_called",
    ),
    (
        "#interleaved coroutine calls",
        "ward_base__error__interleaved_coroutine_calls",
    ),
    ("#too much data", "ward_base__error__too_much_data"),
    (
        "$even more information",
        "ward_base__suspension__even_more_information",
    ),
    ("$short read", "ward_base__suspension__short_read"),
    ("$short write", "ward_base__suspension__short_write"),
    ("@end of data", "ward_base__note__end_of_data"),
    ("@metadata reported", "ward_base__note__metadata_reported"),
];

pub fn base_status_cname(msg: &str) -> Option<&'static str> {
    BASE_STATUSES
        .iter()
        .find(|(m, _)| *m == msg)
        .map(|(_, c)| *c)
}

pub fn base_header() -> String {
    let mut out = String::with_capacity(BASE_C_HEADER.len() + 2048);
    out.push_str(BASE_C_HEADER_TOP);
    for (msg, cname) in BASE_STATUSES {
        out.push_str(&format!("static const char {cname}[] = {msg:?};\n"));
    }
    out.push_str(BASE_C_HEADER);
    out
}

const BASE_C_HEADER_TOP: &str = r#"#ifndef WARD_BASE_H
#define WARD_BASE_H

#include <stdbool.h>
#include <stddef.h>
#include <stdint.h>
#include <string.h>

#define WARD_VERSION ((uint64_t)0x0000000100000000)

#define WARD_INITIALIZE__ALREADY_ZEROED ((uint32_t)0x00000001)
#define WARD_INITIALIZE__LEAVE_INTERNAL_BUFFERS_UNINITIALIZED ((uint32_t)0x00000002)
#define WARD_BASE__MAGIC ((uint32_t)0x3CCB6C71)

#if defined(__GNUC__)
#define WARD_BASE__POTENTIALLY_UNUSED __attribute__((unused))
#define WARD_BASE__LIKELY(expr) (__builtin_expect(!!(expr), 1))
#define WARD_BASE__UNLIKELY(expr) (__builtin_expect(!!(expr), 0))
#else
#define WARD_BASE__POTENTIALLY_UNUSED
#define WARD_BASE__LIKELY(expr) (expr)
#define WARD_BASE__UNLIKELY(expr) (expr)
#endif

"#;

const BASE_C_HEADER: &str = r#"
// ---------------- Status

typedef struct {
  const char* repr;
} ward_base__status;

static inline ward_base__status ward_base__make_status(const char* repr) {
  ward_base__status z;
  z.repr = repr;
  return z;
}

static inline bool ward_base__status__is_ok(const ward_base__status* z) {
  return z->repr == NULL;
}

static inline bool ward_base__status__is_error(const ward_base__status* z) {
  return z->repr && (*z->repr == '#');
}

static inline bool ward_base__status__is_suspension(const ward_base__status* z) {
  return z->repr && (*z->repr == '$');
}

static inline bool ward_base__status__is_note(const ward_base__status* z) {
  return z->repr && (*z->repr != '$') && (*z->repr != '#');
}

static inline bool ward_base__status__is_complete(const ward_base__status* z) {
  return (z->repr == NULL) || ((*z->repr != '$') && (*z->repr != '#'));
}

static inline ward_base__status ward_private_impl__status__ensure_not_a_suspension(
    ward_base__status z) {
  if (z.repr && (*z.repr == '$')) {
    z.repr = ward_base__error__cannot_return_a_suspension;
  }
  return z;
}

static inline void ward_private_impl__ignore_status(ward_base__status z) {
  (void)(z);
}

typedef struct {
  uint8_t private_impl;
} ward_base__empty_struct;

static inline ward_base__empty_struct ward_base__make_empty_struct(void) {
  ward_base__empty_struct z;
  z.private_impl = 0;
  return z;
}

// ---------------- Numeric helpers

#define WARD_BASE__LOW_BITS_MASK__U8(n) ((uint8_t)((((uint8_t)1) << (n)) - 1))
#define WARD_BASE__LOW_BITS_MASK__U16(n) ((uint16_t)((((uint16_t)1) << (n)) - 1))
#define WARD_BASE__LOW_BITS_MASK__U32(n) ((((uint32_t)1) << (n)) - 1)
#define WARD_BASE__LOW_BITS_MASK__U64(n) ((((uint64_t)1) << (n)) - 1)

#define WARD_BASE__DEFINE_UINT_HELPERS(bits)                                  \
  static inline uint##bits##_t ward_base__u##bits##__min(uint##bits##_t x,    \
                                                         uint##bits##_t y) {  \
    return x < y ? x : y;                                                     \
  }                                                                           \
  static inline uint##bits##_t ward_base__u##bits##__max(uint##bits##_t x,    \
                                                         uint##bits##_t y) {  \
    return x > y ? x : y;                                                     \
  }                                                                           \
  static inline uint##bits##_t ward_base__u##bits##__sat_add(                 \
      uint##bits##_t x, uint##bits##_t y) {                                   \
    uint##bits##_t res = (uint##bits##_t)(x + y);                             \
    res |= (uint##bits##_t)(-(res < x));                                      \
    return res;                                                               \
  }                                                                           \
  static inline uint##bits##_t ward_base__u##bits##__sat_sub(                 \
      uint##bits##_t x, uint##bits##_t y) {                                   \
    uint##bits##_t res = (uint##bits##_t)(x - y);                             \
    res &= (uint##bits##_t)(-(res <= x));                                     \
    return res;                                                               \
  }                                                                           \
  static inline void ward_private_impl__u##bits##__sat_add_indirect(          \
      uint##bits##_t* x, uint##bits##_t y) {                                  \
    *x = ward_base__u##bits##__sat_add(*x, y);                                \
  }                                                                           \
  static inline void ward_private_impl__u##bits##__sat_sub_indirect(          \
      uint##bits##_t* x, uint##bits##_t y) {                                  \
    *x = ward_base__u##bits##__sat_sub(*x, y);                                \
  }

WARD_BASE__DEFINE_UINT_HELPERS(8)
WARD_BASE__DEFINE_UINT_HELPERS(16)
WARD_BASE__DEFINE_UINT_HELPERS(32)
WARD_BASE__DEFINE_UINT_HELPERS(64)

// ---------------- Peek and poke

static inline uint8_t ward_base__peek_u8be__no_bounds_check(const uint8_t* p) {
  return p[0];
}

static inline uint16_t ward_base__peek_u16le__no_bounds_check(const uint8_t* p) {
  return (uint16_t)(((uint16_t)(p[0]) << 0) | ((uint16_t)(p[1]) << 8));
}

static inline uint16_t ward_base__peek_u16be__no_bounds_check(const uint8_t* p) {
  return (uint16_t)(((uint16_t)(p[0]) << 8) | ((uint16_t)(p[1]) << 0));
}

static inline uint32_t ward_base__peek_u32le__no_bounds_check(const uint8_t* p) {
  return ((uint32_t)(p[0]) << 0) | ((uint32_t)(p[1]) << 8) |
         ((uint32_t)(p[2]) << 16) | ((uint32_t)(p[3]) << 24);
}

static inline uint32_t ward_base__peek_u32be__no_bounds_check(const uint8_t* p) {
  return ((uint32_t)(p[0]) << 24) | ((uint32_t)(p[1]) << 16) |
         ((uint32_t)(p[2]) << 8) | ((uint32_t)(p[3]) << 0);
}

static inline uint64_t ward_base__peek_u64le__no_bounds_check(const uint8_t* p) {
  return ((uint64_t)(ward_base__peek_u32le__no_bounds_check(p + 4)) << 32) |
         ((uint64_t)(ward_base__peek_u32le__no_bounds_check(p + 0)) << 0);
}

static inline uint64_t ward_base__peek_u64be__no_bounds_check(const uint8_t* p) {
  return ((uint64_t)(ward_base__peek_u32be__no_bounds_check(p + 0)) << 32) |
         ((uint64_t)(ward_base__peek_u32be__no_bounds_check(p + 4)) << 0);
}

static inline void ward_base__poke_u16le__no_bounds_check(uint8_t* p, uint16_t x) {
  p[0] = (uint8_t)(x >> 0);
  p[1] = (uint8_t)(x >> 8);
}

static inline void ward_base__poke_u16be__no_bounds_check(uint8_t* p, uint16_t x) {
  p[0] = (uint8_t)(x >> 8);
  p[1] = (uint8_t)(x >> 0);
}

static inline void ward_base__poke_u32le__no_bounds_check(uint8_t* p, uint32_t x) {
  ward_base__poke_u16le__no_bounds_check(p + 0, (uint16_t)(x >> 0));
  ward_base__poke_u16le__no_bounds_check(p + 2, (uint16_t)(x >> 16));
}

static inline void ward_base__poke_u32be__no_bounds_check(uint8_t* p, uint32_t x) {
  ward_base__poke_u16be__no_bounds_check(p + 0, (uint16_t)(x >> 16));
  ward_base__poke_u16be__no_bounds_check(p + 2, (uint16_t)(x >> 0));
}

static inline void ward_base__poke_u64le__no_bounds_check(uint8_t* p, uint64_t x) {
  ward_base__poke_u32le__no_bounds_check(p + 0, (uint32_t)(x >> 0));
  ward_base__poke_u32le__no_bounds_check(p + 4, (uint32_t)(x >> 32));
}

static inline void ward_base__poke_u64be__no_bounds_check(uint8_t* p, uint64_t x) {
  ward_base__poke_u32be__no_bounds_check(p + 0, (uint32_t)(x >> 32));
  ward_base__poke_u32be__no_bounds_check(p + 4, (uint32_t)(x >> 0));
}

// ---------------- Slices and tables

typedef struct {
  uint8_t* ptr;
  size_t len;
} ward_base__slice_u8;

typedef struct {
  uint8_t* ptr;
  size_t width;
  size_t height;
  size_t stride;
} ward_base__table_u8;

static inline ward_base__slice_u8 ward_base__make_slice_u8(uint8_t* ptr, size_t len) {
  ward_base__slice_u8 s;
  s.ptr = ptr;
  s.len = len;
  return s;
}

static inline ward_base__slice_u8 ward_base__make_slice_u8_ij(uint8_t* ptr, size_t i, size_t j) {
  return ward_base__make_slice_u8(ptr + i, j - i);
}

static inline ward_base__slice_u8 ward_base__slice_u8__subslice_i(ward_base__slice_u8 s, uint64_t i) {
  if ((i <= SIZE_MAX) && (i <= s.len)) {
    return ward_base__make_slice_u8(s.ptr + i, ((size_t)(s.len - i)));
  }
  return ward_base__make_slice_u8(NULL, 0);
}

static inline ward_base__slice_u8 ward_base__slice_u8__subslice_j(ward_base__slice_u8 s, uint64_t j) {
  if ((j <= SIZE_MAX) && (j <= s.len)) {
    return ward_base__make_slice_u8(s.ptr, ((size_t)j));
  }
  return ward_base__make_slice_u8(NULL, 0);
}

static inline ward_base__slice_u8 ward_base__slice_u8__subslice_ij(ward_base__slice_u8 s,
                                                                   uint64_t i,
                                                                   uint64_t j) {
  if ((i <= j) && (j <= SIZE_MAX) && (j <= s.len)) {
    return ward_base__make_slice_u8(s.ptr + i, ((size_t)(j - i)));
  }
  return ward_base__make_slice_u8(NULL, 0);
}

static inline uint8_t* ward_base__strip_const_from_u8_ptr(const uint8_t* ptr) {
  return (uint8_t*)ptr;
}

static inline uint64_t ward_private_impl__slice_u8__copy_from_slice(ward_base__slice_u8 dst,
                                                                    ward_base__slice_u8 src) {
  size_t len = dst.len < src.len ? dst.len : src.len;
  if (len > 0) {
    memmove(dst.ptr, src.ptr, len);
  }
  return len;
}

static inline const uint8_t* ward_private_impl__ptr_u8_plus_len(const uint8_t* ptr, size_t len) {
  return len ? (ptr + len) : ptr;
}

// Greatest multiple of iter_advance, plus one iter_len, that fits in input_len.
static inline size_t ward_private_impl__iterate_total_advance(size_t input_len,
                                                              size_t iter_len,
                                                              size_t iter_advance) {
  if (input_len >= iter_len) {
    size_t n = input_len - iter_len;
    return ((n / iter_advance) * iter_advance) + iter_advance;
  }
  return 0;
}

// ---------------- I/O buffers

typedef struct {
  size_t wi;
  size_t ri;
  uint64_t pos;
  bool closed;
} ward_base__io_buffer_meta;

typedef struct {
  ward_base__slice_u8 data;
  ward_base__io_buffer_meta meta;
} ward_base__io_buffer;

typedef struct {
  uint64_t* ptr;
  size_t len;
} ward_base__slice_u64;

typedef struct {
  ward_base__slice_u64 data;
  ward_base__io_buffer_meta meta;
} ward_base__token_buffer;

static inline ward_base__io_buffer* ward_private_impl__io_reader__set(
    ward_base__io_buffer* b,
    const uint8_t** ptr_iop_r,
    const uint8_t** ptr_io0_r,
    const uint8_t** ptr_io1_r,
    const uint8_t** ptr_io2_r,
    ward_base__slice_u8 data,
    uint64_t history_position) {
  b->data = data;
  b->meta.wi = data.len;
  b->meta.ri = 0;
  b->meta.pos = history_position;
  b->meta.closed = false;
  *ptr_iop_r = data.ptr;
  *ptr_io0_r = data.ptr;
  *ptr_io1_r = data.ptr;
  *ptr_io2_r = data.ptr + data.len;
  return b;
}

static inline ward_base__io_buffer* ward_private_impl__io_writer__set(
    ward_base__io_buffer* b,
    uint8_t** ptr_iop_w,
    uint8_t** ptr_io0_w,
    uint8_t** ptr_io1_w,
    uint8_t** ptr_io2_w,
    ward_base__slice_u8 data,
    uint64_t history_position) {
  b->data = data;
  b->meta.wi = 0;
  b->meta.ri = 0;
  b->meta.pos = history_position;
  b->meta.closed = false;
  *ptr_iop_w = data.ptr;
  *ptr_io0_w = data.ptr;
  *ptr_io1_w = data.ptr;
  *ptr_io2_w = data.ptr + data.len;
  return b;
}

static inline void ward_private_impl__io_reader__limit(const uint8_t** ptr_io2_r,
                                                       const uint8_t* iop_r,
                                                       uint64_t limit) {
  if (((uint64_t)(*ptr_io2_r - iop_r)) > limit) {
    *ptr_io2_r = iop_r + limit;
  }
}

static inline void ward_private_impl__io_writer__limit(uint8_t** ptr_io2_w,
                                                       uint8_t* iop_w,
                                                       uint64_t limit) {
  if (((uint64_t)(*ptr_io2_w - iop_w)) > limit) {
    *ptr_io2_w = iop_w + limit;
  }
}

static inline uint64_t ward_private_impl__io_reader__position(const ward_base__io_buffer* b,
                                                              const uint8_t* iop_r) {
  return b ? ward_base__u64__sat_add(b->meta.pos, ((uint64_t)(iop_r - b->data.ptr))) : 0;
}

static inline uint64_t ward_private_impl__io_writer__position(const ward_base__io_buffer* b,
                                                              const uint8_t* iop_w) {
  return b ? ward_base__u64__sat_add(b->meta.pos, ((uint64_t)(iop_w - b->data.ptr))) : 0;
}

static inline bool ward_private_impl__io_buffer__is_closed(const ward_base__io_buffer* b) {
  return b && b->meta.closed;
}

// ---------------- CPU architecture dispatch

#if defined(__GNUC__) && (defined(__x86_64__) || defined(__i386__))
#define WARD_BASE__MAYBE_ATTRIBUTE_TARGET(arg) __attribute__((target(arg)))
#else
#define WARD_BASE__MAYBE_ATTRIBUTE_TARGET(arg)
#endif

#if defined(__ARM_FEATURE_CRC32)
#define WARD_PRIVATE_IMPL__CPU_ARCH__ARM_CRC32
#endif
#if defined(__ARM_NEON)
#define WARD_PRIVATE_IMPL__CPU_ARCH__ARM_NEON
#endif
#if defined(__GNUC__) && defined(__x86_64__)
#define WARD_PRIVATE_IMPL__CPU_ARCH__X86_64_V2
#define WARD_PRIVATE_IMPL__CPU_ARCH__X86_64_V3
#endif

static inline bool ward_base__cpu_arch__have_arm_crc32(void) {
#if defined(WARD_PRIVATE_IMPL__CPU_ARCH__ARM_CRC32)
  return true;
#else
  return false;
#endif
}

static inline bool ward_base__cpu_arch__have_arm_neon(void) {
#if defined(WARD_PRIVATE_IMPL__CPU_ARCH__ARM_NEON)
  return true;
#else
  return false;
#endif
}

static inline bool ward_base__cpu_arch__have_x86_sse42(void) {
#if defined(WARD_PRIVATE_IMPL__CPU_ARCH__X86_64_V2)
  return __builtin_cpu_supports("sse4.2") && __builtin_cpu_supports("popcnt");
#else
  return false;
#endif
}

static inline bool ward_base__cpu_arch__have_x86_avx2(void) {
#if defined(WARD_PRIVATE_IMPL__CPU_ARCH__X86_64_V3)
  return __builtin_cpu_supports("avx2") && ward_base__cpu_arch__have_x86_sse42();
#else
  return false;
#endif
}

static inline bool ward_base__cpu_arch__have_x86_bmi2(void) {
#if defined(WARD_PRIVATE_IMPL__CPU_ARCH__X86_64_V3)
  return __builtin_cpu_supports("bmi2");
#else
  return false;
#endif
}

// ---------------- Coroutines

#define WARD_BASE__COROUTINE_SUSPENSION_POINT_0 case 0:;

#define WARD_BASE__COROUTINE_SUSPENSION_POINT(n) \
  coro_susp_point = n;                           \
  case n:;

#define WARD_BASE__COROUTINE_SUSPENSION_POINT_MAYBE_SUSPEND(n) \
  if (!status.repr) {                                          \
    goto ok;                                                   \
  } else if (*status.repr != '$') {                            \
    goto exit;                                                 \
  }                                                            \
  coro_susp_point = n;                                         \
  goto suspend;                                                \
  case n:;

#endif  // WARD_BASE_H
"#;
