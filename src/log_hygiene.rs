// Log hygiene: scans every source file for tracing calls that would put
// clinical values into logs. Only opaque identifiers, levels, scores and
// counts may be logged.
